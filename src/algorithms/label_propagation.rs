use tracing::info;
use crate::algorithms::{
    collect_partitioning, ConvergenceReport, Error, PartitionUpdate, SeedScheduler, StatisticsSync,
};
use crate::engine::{ChromaticEngine, MachineId, Placement};
use crate::graph::Graph;
use crate::Partition;

fn label_propagation(
    partition: &mut [usize],
    graph: &Graph,
    config: &LabelPropagationPartitioner,
) -> Result<PartitionReport, Error> {
    let num_atoms = config.num_atoms;

    if graph.is_empty() {
        return Ok(PartitionReport {
            convergence: ConvergenceReport::default(),
            machines: Vec::new(),
            counts: vec![0; num_atoms],
            edge_cut: 0,
            imbalance: 0.0,
        });
    }

    // Engine streams and the scheduler share one seed so a seeded run is reproducible.
    let seed = config.seed.unwrap_or_else(rand::random);
    let placement = Placement::contiguous(graph.len(), config.num_machines)?;
    let mut engine = ChromaticEngine::new(
        graph,
        placement,
        StatisticsSync { num_atoms },
        config.sync_interval,
        seed,
    )?;
    engine.color_randomly(config.num_colors)?;

    let update = PartitionUpdate::new(num_atoms, config.max_changes);
    let convergence = SeedScheduler::new(num_atoms, Some(seed))
        .with_max_rounds(config.max_rounds)
        .run(&mut engine, &update)?;

    let result = collect_partitioning(&engine, num_atoms)?;
    partition.copy_from_slice(&result.atoms);

    let imbalance = result.imbalance();
    let edge_cut = engine.shared().edge_cut;
    info!(edge_cut, imbalance, counts = ?result.counts, "collected partitioning");

    Ok(PartitionReport {
        convergence,
        machines: result.machines,
        counts: result.counts,
        edge_cut,
        imbalance,
    })
}

/// Diagnostic data of a label propagation run.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub convergence: ConvergenceReport,

    /// Machine that owned each vertex, in vertex order.
    pub machines: Vec<MachineId>,

    /// Number of vertices per atom.
    pub counts: Vec<usize>,

    /// Edges whose endpoints ended up in different atoms, each undirected edge counted once.
    pub edge_cut: usize,

    pub imbalance: f64,
}

/// Balanced k-way partitioner based on label propagation.
///
/// Every atom starts from one random seed vertex and grows by label propagation. A vertex
/// joins the atom that is most represented around it relative to its global size, so small
/// atoms win contested regions and the parts stay balanced. Vertices that no atom reached are
/// seeded in later rounds.
///
/// # Example
///
/// ```rust
/// use atomcut::algorithms::LabelPropagationPartitioner;
/// use atomcut::graph::Graph;
/// use atomcut::Partition;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
///
///     let edges: Vec<(usize, usize)> = (0..20).map(|v| (v, (v + 1) % 20)).collect();
///     let graph = Graph::undirected_from_edges(20, &edges);
///     let mut partition = vec![0; graph.len()];
///
///     let mut partitioner =
///         LabelPropagationPartitioner { num_atoms: 4, seed: Some(7), ..Default::default() };
///     let report = partitioner.partition(&mut partition, &graph)?;
///
///     assert!(partition.iter().all(|&atom| atom < 4));
///     assert_eq!(report.edge_cut, graph.edge_cut(&partition));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LabelPropagationPartitioner {
    /// Number of atoms (parts) to create.
    pub num_atoms: usize,

    /// Number of vertex updates between two refreshes of the global statistics.
    pub sync_interval: usize,

    /// Maximum number of times a vertex may change its atom.
    pub max_changes: usize,

    /// Number of colors used to batch the vertex updates.
    pub num_colors: usize,

    /// Number of simulated machines the vertices are spread over.
    pub num_machines: usize,

    /// Seed for seeding, coloring and sampling. A random one is drawn when `None`.
    pub seed: Option<u64>,

    /// Give up after this many rounds if vertices are still unset.
    pub max_rounds: Option<usize>,
}

impl Default for LabelPropagationPartitioner {
    fn default() -> Self {
        LabelPropagationPartitioner {
            num_atoms: 10,
            sync_interval: 100,
            max_changes: 10,
            num_colors: 10,
            num_machines: 1,
            seed: None,
            max_rounds: None,
        }
    }
}

impl<'a> Partition<&'a Graph> for LabelPropagationPartitioner {
    type Metadata = PartitionReport;
    type Error = Error;

    fn partition(
        &mut self,
        part_ids: &mut [usize],
        graph: &'a Graph,
    ) -> Result<Self::Metadata, Self::Error> {

        if part_ids.len() != graph.len() {
            return Err(Error::InputLenMismatch {
                expected: part_ids.len(),
                actual: graph.len(),
            });
        }
        if self.num_atoms == 0 {
            return Err(Error::InvalidParameter("num_atoms must be positive".to_string()));
        }
        if self.max_changes == 0 {
            return Err(Error::InvalidParameter("max_changes must be positive".to_string()));
        }
        label_propagation(part_ids, graph, self)
    }
}

#[cfg(test)]
mod tests {
    use crate::imbalance::imbalance;
    use super::*;

    fn grid(side: usize) -> Graph {
        let mut edges = Vec::new();
        for row in 0..side {
            for col in 0..side {
                let vertex = row * side + col;
                if col + 1 < side {
                    edges.push((vertex, vertex + 1));
                }
                if row + 1 < side {
                    edges.push((vertex, vertex + side));
                }
            }
        }
        Graph::undirected_from_edges(side * side, &edges)
    }

    #[test]
    fn test_grid_partition_is_complete_and_consistent() {
        // Arrange
        let graph = grid(10);
        let mut partition = vec![0; graph.len()];
        let mut partitioner = LabelPropagationPartitioner {
            num_atoms: 4,
            num_machines: 3,
            sync_interval: 20,
            seed: Some(11),
            ..Default::default()
        };

        // Act
        let report = partitioner.partition(&mut partition, &graph).unwrap();

        // Assert
        assert!(partition.iter().all(|&atom| atom < 4));
        assert_eq!(report.counts.iter().sum::<usize>(), 100);
        assert_eq!(report.edge_cut, graph.edge_cut(&partition));
        assert_eq!(report.imbalance, imbalance(4, &partition));
        assert!(report.imbalance >= 1.0 && report.imbalance <= 4.0);
        assert!(report.convergence.rounds >= 1);
        assert!(report.convergence.seeds_placed >= 4);
    }

    #[test]
    fn test_machine_mapping_follows_contiguous_placement() {
        // Arrange
        let graph = grid(5);
        let mut partition = vec![0; graph.len()];
        let mut partitioner = LabelPropagationPartitioner {
            num_atoms: 2,
            num_machines: 4,
            seed: Some(3),
            ..Default::default()
        };

        // Act
        let report = partitioner.partition(&mut partition, &graph).unwrap();

        // Assert
        let placement = Placement::contiguous(25, 4).unwrap();
        let expected: Vec<usize> = (0..25).map(|vertex| placement.owner(vertex)).collect();
        assert_eq!(report.machines, expected);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        // Arrange
        let graph = grid(8);
        let mut first = vec![0; graph.len()];
        let mut second = vec![0; graph.len()];
        let mut partitioner = LabelPropagationPartitioner {
            num_atoms: 3,
            num_machines: 2,
            seed: Some(42),
            ..Default::default()
        };

        // Act
        let first_report = partitioner.partition(&mut first, &graph).unwrap();
        let second_report = partitioner.partition(&mut second, &graph).unwrap();

        // Assert
        assert_eq!(first, second);
        assert_eq!(first_report, second_report);
    }

    #[test]
    fn test_disconnected_components_are_all_assigned() {
        // Arrange
        // Four separate triangles and two isolated vertices.
        let mut edges = Vec::new();
        for triangle in 0..4 {
            let base = triangle * 3;
            edges.extend([(base, base + 1), (base + 1, base + 2), (base + 2, base)]);
        }
        let graph = Graph::undirected_from_edges(14, &edges);
        let mut partition = vec![0; graph.len()];
        let mut partitioner = LabelPropagationPartitioner {
            num_atoms: 2,
            seed: Some(9),
            ..Default::default()
        };

        // Act
        let report = partitioner.partition(&mut partition, &graph).unwrap();

        // Assert
        assert!(partition.iter().all(|&atom| atom < 2));
        assert_eq!(report.counts.iter().sum::<usize>(), 14);
        assert!(report.convergence.rounds > 1);
    }

    #[test]
    fn test_empty_graph() {
        let graph = Graph::new();
        let mut partition = Vec::new();

        let report = LabelPropagationPartitioner::default()
            .partition(&mut partition, &graph)
            .unwrap();

        assert_eq!(report.counts, vec![0; 10]);
        assert_eq!(report.edge_cut, 0);
    }

    #[test]
    fn test_invalid_input() {
        let graph = grid(3);

        let mut short = vec![0; 4];
        assert_eq!(
            LabelPropagationPartitioner::default().partition(&mut short, &graph),
            Err(Error::InputLenMismatch { expected: 4, actual: 9 })
        );

        let mut partition = vec![0; 9];
        assert_eq!(
            LabelPropagationPartitioner { num_atoms: 20, seed: Some(1), ..Default::default() }
                .partition(&mut partition, &graph),
            Err(Error::TooManyAtoms { num_atoms: 20, num_vertices: 9 })
        );
        assert!(LabelPropagationPartitioner { num_atoms: 0, ..Default::default() }
            .partition(&mut partition, &graph)
            .is_err());
        assert!(LabelPropagationPartitioner { num_colors: 0, seed: Some(1), ..Default::default() }
            .partition(&mut partition, &graph)
            .is_err());
    }
}
