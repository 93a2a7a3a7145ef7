use std::collections::BTreeSet;
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use tracing::info;
use crate::algorithms::{Error, GlobalStatistics, PartitionUpdate, StatisticsSync, VertexRecord};
use crate::engine::{ChromaticEngine, VertexId};

/// Engine specialized for label propagation partitioning.
pub type PartitionEngine<'g> = ChromaticEngine<'g, VertexRecord, StatisticsSync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Nothing seeded yet.
    Init,
    /// The engine is running the queued updates to quiescence.
    Run,
    /// Reading the statistics of a finished round.
    Check,
    /// Every vertex has an atom.
    Done,
}

/// Counters over all rounds of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub rounds: usize,
    pub seeds_placed: usize,
    pub updates: usize,
    pub syncs: usize,
}

/// Outer control loop of the partitioner.
///
/// Seeds one vertex per atom, then runs the engine to quiescence. After each round it reads
/// the final statistics. If vertices are still unset, for example in components no seed
/// reached or behind vertices that used up their changes, it pins up to `num_atoms` of them
/// from the reservoir sample as fresh seeds and runs again.
#[derive(Debug, Clone)]
pub struct SeedScheduler {
    num_atoms: usize,
    initial_seeds: Option<Vec<VertexId>>,
    max_rounds: Option<usize>,
    rng: SmallRng,
    phase: SchedulerPhase,
}

impl SeedScheduler {
    pub fn new(num_atoms: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            num_atoms,
            initial_seeds: None,
            max_rounds: None,
            rng,
            phase: SchedulerPhase::Init,
        }
    }

    /// Use these vertices as the first seeds instead of a random pick. Vertex `i` gets atom `i`.
    pub fn with_initial_seeds(mut self, seeds: Vec<VertexId>) -> Self {
        self.initial_seeds = Some(seeds);
        self
    }

    /// Fail once this many rounds ran without assigning every vertex.
    pub fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Pin one distinct vertex per atom and schedule it.
    pub fn seed_initial(
        &mut self,
        engine: &mut PartitionEngine<'_>,
    ) -> Result<Vec<VertexId>, Error> {
        if self.num_atoms == 0 {
            return Err(Error::InvalidParameter("at least one atom is required".to_string()));
        }
        let num_vertices = engine.graph().len();

        let seeds = match self.initial_seeds.take() {
            Some(seeds) => {
                if seeds.len() != self.num_atoms {
                    return Err(Error::InvalidParameter(format!(
                        "{} initial seeds given for {} atoms",
                        seeds.len(),
                        self.num_atoms
                    )));
                }
                let distinct: BTreeSet<VertexId> = seeds.iter().copied().collect();
                let out_of_range = seeds.iter().any(|&vertex| vertex >= num_vertices);
                if distinct.len() != seeds.len() || out_of_range {
                    return Err(Error::InvalidParameter(
                        "initial seeds must be distinct vertices of the graph".to_string(),
                    ));
                }
                seeds
            }
            None => {
                if self.num_atoms > num_vertices {
                    return Err(Error::TooManyAtoms {
                        num_atoms: self.num_atoms,
                        num_vertices,
                    });
                }
                sample(&mut self.rng, num_vertices, self.num_atoms).into_vec()
            }
        };

        for (atom, &vertex) in seeds.iter().enumerate() {
            place_seed(engine, vertex, atom);
        }
        Ok(seeds)
    }

    /// Pin the first `min(num_atoms, num_unset)` reservoir vertices, giving the i-th one atom i.
    pub fn reseed(
        &mut self,
        engine: &mut PartitionEngine<'_>,
        statistics: &GlobalStatistics,
    ) -> Result<usize, Error> {
        let count = self.num_atoms.min(statistics.num_unset);
        if statistics.reservoir.len() < count {
            return Err(Error::ReservoirInvariant {
                expected: count,
                actual: statistics.reservoir.len(),
            });
        }

        for (atom, &vertex) in statistics.reservoir[..count].iter().enumerate() {
            place_seed(engine, vertex, atom);
        }
        Ok(count)
    }

    /// Seed, then alternate runs and reseeding until no vertex is left unset.
    pub fn run(
        &mut self,
        engine: &mut PartitionEngine<'_>,
        update: &PartitionUpdate,
    ) -> Result<ConvergenceReport, Error> {
        let mut report = ConvergenceReport::default();

        self.phase = SchedulerPhase::Init;
        report.seeds_placed += self.seed_initial(engine)?.len();

        loop {
            self.phase = SchedulerPhase::Run;
            info!(round = report.rounds, pending = engine.pending(), "starting round");
            let run = engine.start(update)?;
            report.rounds += 1;
            report.updates += run.updates;
            report.syncs += run.syncs;

            self.phase = SchedulerPhase::Check;
            let statistics = engine.shared();
            info!(
                round = report.rounds,
                updates = run.updates,
                num_unset = statistics.num_unset,
                edge_cut = statistics.edge_cut,
                vertex_balance = statistics.vertex_balance(),
                "finished round"
            );
            if statistics.num_unset == 0 {
                break;
            }
            if let Some(max_rounds) = self.max_rounds {
                if report.rounds >= max_rounds {
                    return Err(Error::RoundLimitExceeded {
                        rounds: report.rounds,
                        num_unset: statistics.num_unset,
                    });
                }
            }

            report.seeds_placed += self.reseed(engine, &statistics)?;
        }

        self.phase = SchedulerPhase::Done;
        info!(rounds = report.rounds, seeds = report.seeds_placed, "finished partitioning");
        Ok(report)
    }
}

fn place_seed(engine: &mut PartitionEngine<'_>, vertex: VertexId, atom: usize) {
    engine.set_vertex_data(vertex, VertexRecord::seed(atom));
    engine.schedule(vertex);
    info!(vertex, atom, "adding seed");
}
