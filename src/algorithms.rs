mod atom_selector;
mod label_propagation;
mod result_collector;
mod seed_scheduler;
mod statistics;
mod vertex_program;

pub use atom_selector::{AtomHistogram, AtomSelector};
pub use label_propagation::{LabelPropagationPartitioner, PartitionReport};
pub use result_collector::{collect_partitioning, PartitionResult};
pub use seed_scheduler::{ConvergenceReport, PartitionEngine, SchedulerPhase, SeedScheduler};
pub use statistics::{GlobalStatistics, StatisticsAccumulator, StatisticsSync};
pub use vertex_program::{PartitionUpdate, VertexRecord};

/// Partition identifier, in `0..num_atoms`.
pub type AtomId = usize;

/// Common errors thrown by algorithms.
///
/// Every variant is fatal: the run is aborted and nothing is retried.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Atom selection was asked to choose from no neighbors.
    #[error("atom histogram is empty")]
    EmptyHistogram,

    /// The local histogram does not sum to a positive value.
    #[error("atom histogram sums to {sum}, expected a positive total")]
    NonPositiveNormalization { sum: f64 },

    /// The global snapshot carries an atom with no members.
    #[error("global share of atom {atom} is {share}, expected a positive value")]
    ZeroGlobalShare { atom: AtomId, share: f64 },

    /// An atom id escaped `0..num_atoms`.
    #[error("atom {atom} is out of range for {num_atoms} atoms")]
    AtomOutOfRange { atom: AtomId, num_atoms: usize },

    /// Two reservoirs of different capacities were merged.
    #[error("reservoir capacities differ (expected {expected}, got {actual})")]
    ReservoirCapacityMismatch { expected: usize, actual: usize },

    /// The reservoir holds fewer valid entries than `min(num_unset, capacity)`.
    #[error("reservoir holds {actual} valid entries, expected {expected}")]
    ReservoirInvariant { expected: usize, actual: usize },

    /// A vertex was still unassigned when the result was gathered.
    #[error("vertex {vertex} owned by machine {machine} has no atom")]
    UnsetVertex { vertex: usize, machine: usize },

    /// More atoms were requested than there are vertices to seed.
    #[error("cannot seed {num_atoms} atoms on a graph of {num_vertices} vertices")]
    TooManyAtoms { num_atoms: usize, num_vertices: usize },

    /// The optional round guard fired before every vertex was assigned.
    #[error("{num_unset} vertices still unset after {rounds} rounds")]
    RoundLimitExceeded { rounds: usize, num_unset: usize },

    /// A configuration value is out of its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Input sets don't have matching lengths.
    #[error("input sets don't have the same length (expected {expected} items, got {actual})")]
    InputLenMismatch { expected: usize, actual: usize },
}
