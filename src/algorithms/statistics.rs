use std::collections::BTreeMap;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;
use crate::algorithms::{AtomId, Error, VertexRecord};
use crate::engine::{Scope, SyncOperation, VertexId};

/// Statistics folded from part of the graph during one sync window.
///
/// The reservoir holds a uniform sample of the unset vertices seen so far. It always holds
/// exactly `min(num_unset, capacity)` vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsAccumulator {
    pub atom_counts: BTreeMap<AtomId, usize>,
    pub num_unset: usize,
    pub edge_cut: usize,
    pub visited: usize,
    reservoir: Vec<VertexId>,
    capacity: usize,
}

impl StatisticsAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            atom_counts: BTreeMap::new(),
            num_unset: 0,
            edge_cut: 0,
            visited: 0,
            reservoir: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reservoir(&self) -> &[VertexId] {
        &self.reservoir
    }

    /// Fold one vertex into the statistics.
    ///
    /// A cut edge is counted from its larger endpoint only, so each undirected edge counts once
    /// no matter how many directions it is stored in.
    pub fn add_vertex(&mut self, scope: &Scope<'_, VertexRecord>, rng: &mut SmallRng) {
        self.visited += 1;
        let vdata = *scope.vertex_data();
        if vdata.is_set {
            *self.atom_counts.entry(vdata.atom_id).or_insert(0) += 1;
            let vertex = scope.vertex();
            self.edge_cut += scope
                .neighbors()
                .take_while(|&neighbor| neighbor < vertex)
                .filter(|&neighbor| {
                    let ndata = scope.neighbor_vertex_data(neighbor);
                    ndata.is_set && ndata.atom_id != vdata.atom_id
                })
                .count();
        } else {
            self.add_unset(scope.vertex(), rng);
        }
    }

    /// Count an unset vertex and offer it to the reservoir.
    ///
    /// The n-th unset vertex replaces a random slot with probability `capacity / n`.
    pub fn add_unset(&mut self, vertex: VertexId, rng: &mut SmallRng) {
        self.num_unset += 1;
        if self.reservoir.len() < self.capacity {
            self.reservoir.push(vertex);
        } else {
            let slot = rng.gen_range(0..self.num_unset);
            if slot < self.capacity {
                self.reservoir[slot] = vertex;
            }
        }
    }

    /// Combine the statistics of another part of the graph into this one.
    ///
    /// Counters are summed. The reservoirs are merged slot by slot. Each slot draws from the
    /// other side with probability `remaining_other / remaining_total`, where "remaining"
    /// counts the unset vertices of a side not yet drawn. Both reservoirs are shuffled first so
    /// that every prefix is itself a uniform sample.
    pub fn merge(&mut self, other: StatisticsAccumulator, rng: &mut SmallRng) -> Result<(), Error> {
        if other.capacity != self.capacity {
            return Err(Error::ReservoirCapacityMismatch {
                expected: self.capacity,
                actual: other.capacity,
            });
        }

        self.edge_cut += other.edge_cut;
        self.visited += other.visited;
        for (atom, count) in other.atom_counts {
            *self.atom_counts.entry(atom).or_insert(0) += count;
        }

        if self.num_unset == 0 {
            self.reservoir = other.reservoir;
        } else if other.num_unset > 0 {
            let mut mine = std::mem::take(&mut self.reservoir);
            let mut theirs = other.reservoir;
            mine.shuffle(rng);
            theirs.shuffle(rng);

            let mut merged = Vec::with_capacity(self.capacity);
            let (mut j, mut k) = (0, 0);
            while merged.len() < self.capacity && j < mine.len() && k < theirs.len() {
                let remaining_mine = self.num_unset - j;
                let remaining_theirs = other.num_unset - k;
                let accept_prob =
                    remaining_theirs as f64 / (remaining_mine + remaining_theirs) as f64;
                if rng.gen::<f64>() < accept_prob {
                    merged.push(theirs[k]);
                    k += 1;
                } else {
                    merged.push(mine[j]);
                    j += 1;
                }
            }
            while merged.len() < self.capacity && j < mine.len() {
                merged.push(mine[j]);
                j += 1;
            }
            while merged.len() < self.capacity && k < theirs.len() {
                merged.push(theirs[k]);
                k += 1;
            }
            self.reservoir = merged;
        }
        self.num_unset += other.num_unset;

        let expected = self.num_unset.min(self.capacity);
        if self.reservoir.len() != expected {
            return Err(Error::ReservoirInvariant {
                expected,
                actual: self.reservoir.len(),
            });
        }
        Ok(())
    }

    /// Normalize the atom counts into shares of all set vertices.
    pub fn finalize(self, version: u64) -> GlobalStatistics {
        let num_set: usize = self.atom_counts.values().sum();
        let atom_fractions = self
            .atom_counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(&atom, &count)| (atom, count as f64 / num_set as f64))
            .collect();

        GlobalStatistics {
            version,
            atom_counts: self.atom_counts,
            atom_fractions,
            num_unset: self.num_unset,
            edge_cut: self.edge_cut,
            visited: self.visited,
            reservoir: self.reservoir,
        }
    }
}

/// Finalized snapshot of one sync window, read by every update until the next window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalStatistics {
    /// Sync window that produced this snapshot.
    pub version: u64,

    /// Number of set vertices per atom. Atoms without members are absent.
    pub atom_counts: BTreeMap<AtomId, usize>,

    /// Share of the set vertices per atom. Sums to one when any vertex is set.
    pub atom_fractions: BTreeMap<AtomId, f64>,

    pub num_unset: usize,

    /// Cut edges between set vertices, each undirected edge counted once.
    pub edge_cut: usize,

    pub visited: usize,

    /// Uniform sample of the unset vertices, `min(num_unset, num_atoms)` long.
    pub reservoir: Vec<VertexId>,
}

impl GlobalStatistics {
    pub fn num_set(&self) -> usize {
        self.atom_counts.values().sum()
    }

    /// Largest atom share times the number of populated atoms. `1.0` when they are even.
    pub fn vertex_balance(&self) -> f64 {
        let max_share = self.atom_fractions.values().copied().fold(0.0, f64::max);
        max_share * self.atom_fractions.len() as f64
    }
}

/// Registers the statistics with the engine's periodic sync.
#[derive(Debug, Clone, Copy)]
pub struct StatisticsSync {
    pub num_atoms: usize,
}

impl SyncOperation<VertexRecord> for StatisticsSync {
    type Accumulator = StatisticsAccumulator;
    type Shared = GlobalStatistics;

    fn zero(&self) -> StatisticsAccumulator {
        StatisticsAccumulator::new(self.num_atoms)
    }

    fn contribute(
        &self,
        acc: &mut StatisticsAccumulator,
        scope: &Scope<'_, VertexRecord>,
        rng: &mut SmallRng,
    ) {
        acc.add_vertex(scope, rng);
    }

    fn merge(
        &self,
        acc: &mut StatisticsAccumulator,
        other: StatisticsAccumulator,
        rng: &mut SmallRng,
    ) -> Result<(), Error> {
        acc.merge(other, rng)
    }

    fn finalize(
        &self,
        acc: StatisticsAccumulator,
        version: u64,
    ) -> Result<GlobalStatistics, Error> {
        let statistics = acc.finalize(version);
        debug!(
            version,
            visited = statistics.visited,
            num_unset = statistics.num_unset,
            edge_cut = statistics.edge_cut,
            vertex_balance = statistics.vertex_balance(),
            atom_counts = ?statistics.atom_counts,
            "finalized statistics"
        );
        Ok(statistics)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_ulps_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use crate::graph::Graph;
    use super::*;

    fn accumulator(
        capacity: usize,
        unset: impl IntoIterator<Item = VertexId>,
        rng: &mut SmallRng,
    ) -> StatisticsAccumulator {
        let mut acc = StatisticsAccumulator::new(capacity);
        for vertex in unset {
            acc.add_unset(vertex, rng);
        }
        acc
    }

    fn fold_all(graph: &Graph, records: &[VertexRecord], capacity: usize) -> StatisticsAccumulator {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut acc = StatisticsAccumulator::new(capacity);
        for vertex in 0..graph.len() {
            acc.add_vertex(&Scope::new(vertex, graph, records), &mut rng);
        }
        acc
    }

    #[test]
    fn test_reservoir_inclusion_probability() {
        // Arrange
        let (num_ids, capacity, trials) = (20, 5, 20_000);
        let mut rng = SmallRng::seed_from_u64(42);
        let mut hits = vec![0usize; num_ids];

        // Act
        for _ in 0..trials {
            let acc = accumulator(capacity, 0..num_ids, &mut rng);
            for &vertex in acc.reservoir() {
                hits[vertex] += 1;
            }
        }

        // Assert
        let expected = capacity as f64 / num_ids as f64;
        for (vertex, &count) in hits.iter().enumerate() {
            let observed = count as f64 / trials as f64;
            assert!(
                (observed - expected).abs() < 0.02,
                "vertex {vertex} kept with frequency {observed}"
            );
        }
    }

    #[test]
    fn test_reservoir_keeps_everything_under_capacity() {
        let mut rng = SmallRng::seed_from_u64(1);
        let acc = accumulator(5, [7, 3, 9], &mut rng);

        assert_eq!(acc.reservoir(), &[7, 3, 9]);
        assert_eq!(acc.num_unset, 3);
    }

    #[test]
    fn test_add_vertex_counts_atoms_cut_and_unset() {
        // Arrange
        // Path 0-1-2-3 with atoms [0, 0, 1, unset].
        let graph = Graph::undirected_from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let records = [
            VertexRecord::seed(0),
            VertexRecord { atom_id: 0, num_changes: 1, is_set: true, is_seed: false },
            VertexRecord::seed(1),
            VertexRecord::default(),
        ];

        // Act
        let acc = fold_all(&graph, &records, 2);

        // Assert
        assert_eq!(acc.visited, 4);
        assert_eq!(acc.atom_counts, BTreeMap::from([(0, 2), (1, 1)]));
        assert_eq!(acc.edge_cut, 1);
        assert_eq!(acc.num_unset, 1);
        assert_eq!(acc.reservoir(), &[3]);
    }

    #[test]
    fn test_edge_cut_matches_graph_edge_cut() {
        // Arrange
        // Mixed directions: 0->1 only, 1<->2, 2->3, 3->0, plus a self loop on 2.
        let graph = Graph::from_edges(4, &[(0, 1), (1, 2), (2, 1), (2, 3), (3, 0), (2, 2)]);
        let partition = [0, 1, 1, 2];
        let records: Vec<VertexRecord> =
            partition.iter().map(|&atom| VertexRecord::seed(atom)).collect();

        // Act
        let acc = fold_all(&graph, &records, 3);

        // Assert
        assert_eq!(acc.edge_cut, graph.edge_cut(&partition));
        assert_eq!(acc.edge_cut, 3);
    }

    #[test]
    fn test_merge_rejects_capacity_mismatch() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut left = StatisticsAccumulator::new(3);
        let right = StatisticsAccumulator::new(4);

        assert_eq!(
            left.merge(right, &mut rng),
            Err(Error::ReservoirCapacityMismatch { expected: 3, actual: 4 })
        );
    }

    #[test]
    fn test_merge_with_empty_side_keeps_other_reservoir() {
        // Arrange
        let mut rng = SmallRng::seed_from_u64(3);
        let filled = accumulator(3, [10, 11], &mut rng);

        // Act
        let mut left = StatisticsAccumulator::new(3);
        left.merge(filled.clone(), &mut rng).unwrap();
        let mut right = filled.clone();
        right.merge(StatisticsAccumulator::new(3), &mut rng).unwrap();

        // Assert
        assert_eq!(left.reservoir(), &[10, 11]);
        assert_eq!(right.reservoir(), &[10, 11]);
        assert_eq!(left.num_unset, 2);
        assert_eq!(right.num_unset, 2);
    }

    #[test]
    fn test_merge_fills_reservoir_from_both_sides() {
        // Arrange
        let mut rng = SmallRng::seed_from_u64(9);
        let mut left = accumulator(4, [1], &mut rng);
        let right = accumulator(4, [2, 3], &mut rng);

        // Act
        left.merge(right, &mut rng).unwrap();

        // Assert
        let mut reservoir = left.reservoir().to_vec();
        reservoir.sort_unstable();
        assert_eq!(reservoir, vec![1, 2, 3]);
        assert_eq!(left.num_unset, 3);
    }

    #[test]
    fn test_merge_draws_in_proportion_to_unset_mass() {
        // Arrange
        let (capacity, trials) = (4, 10_000);
        let mut rng = SmallRng::seed_from_u64(5);
        let mut from_right = 0usize;

        // Act
        for _ in 0..trials {
            let mut left = accumulator(capacity, 0..30, &mut rng);
            let right = accumulator(capacity, 100..110, &mut rng);
            left.merge(right, &mut rng).unwrap();
            from_right += left.reservoir().iter().filter(|&&vertex| vertex >= 100).count();
        }

        // Assert
        let share = from_right as f64 / (trials * capacity) as f64;
        assert!((share - 0.25).abs() < 0.02, "right side share {share}");
    }

    #[test]
    fn test_merged_reservoir_is_uniform_over_union() {
        // Arrange
        let (capacity, trials) = (4, 10_000);
        let mut rng = SmallRng::seed_from_u64(11);
        let mut hits = vec![0usize; 40];

        // Act
        for _ in 0..trials {
            let mut left = accumulator(capacity, 0..30, &mut rng);
            let right = accumulator(capacity, 30..40, &mut rng);
            left.merge(right, &mut rng).unwrap();
            for &vertex in left.reservoir() {
                hits[vertex] += 1;
            }
        }

        // Assert
        for (vertex, &count) in hits.iter().enumerate() {
            let observed = count as f64 / trials as f64;
            assert!(
                (observed - 0.1).abs() < 0.02,
                "vertex {vertex} kept with frequency {observed}"
            );
        }
    }

    #[test]
    fn test_finalize_normalizes_counts() {
        // Arrange
        let mut acc = StatisticsAccumulator::new(3);
        acc.atom_counts = BTreeMap::from([(0, 1), (1, 1), (2, 1)]);

        // Act
        let statistics = acc.finalize(7);

        // Assert
        let total: f64 = statistics.atom_fractions.values().sum();
        assert_ulps_eq!(total, 1.0, max_ulps = 4);
        assert_eq!(statistics.atom_fractions.len(), 3);
        assert_eq!(statistics.version, 7);
        assert_eq!(statistics.num_set(), 3);
        assert_ulps_eq!(statistics.vertex_balance(), 1.0, max_ulps = 4);
    }

    #[test]
    fn test_finalize_without_set_vertices() {
        let mut rng = SmallRng::seed_from_u64(0);
        let statistics = accumulator(2, [4, 5, 6], &mut rng).finalize(1);

        assert!(statistics.atom_fractions.is_empty());
        assert_eq!(statistics.num_unset, 3);
        assert_eq!(statistics.reservoir.len(), 2);
    }

    fn arbitrary_accumulator() -> impl Strategy<Value = StatisticsAccumulator> {
        (
            prop::collection::btree_map(0usize..8, 1usize..50, 0..6),
            0usize..1000,
            0usize..1000,
            0usize..12,
            any::<u64>(),
        )
            .prop_map(|(atom_counts, edge_cut, visited, num_unset, seed)| {
                let mut rng = SmallRng::seed_from_u64(seed);
                let mut acc = accumulator(4, 0..num_unset, &mut rng);
                acc.atom_counts = atom_counts;
                acc.edge_cut = edge_cut;
                acc.visited = visited;
                acc
            })
    }

    fn additive(acc: &StatisticsAccumulator) -> (BTreeMap<AtomId, usize>, usize, usize, usize) {
        (acc.atom_counts.clone(), acc.edge_cut, acc.visited, acc.num_unset)
    }

    proptest! {
        #[test]
        fn prop_merge_is_associative_on_counters(
            a in arbitrary_accumulator(),
            b in arbitrary_accumulator(),
            c in arbitrary_accumulator(),
        ) {
            let mut rng = SmallRng::seed_from_u64(0);

            let mut bc = b.clone();
            bc.merge(c.clone(), &mut rng).unwrap();
            let mut left_nested = a.clone();
            left_nested.merge(bc, &mut rng).unwrap();

            let mut right_nested = a;
            right_nested.merge(b, &mut rng).unwrap();
            right_nested.merge(c, &mut rng).unwrap();

            prop_assert_eq!(additive(&left_nested), additive(&right_nested));
            prop_assert_eq!(left_nested.reservoir().len(), left_nested.num_unset.min(4));
        }

        #[test]
        fn prop_merge_is_commutative_on_counters(
            a in arbitrary_accumulator(),
            b in arbitrary_accumulator(),
        ) {
            let mut rng = SmallRng::seed_from_u64(0);

            let mut ab = a.clone();
            ab.merge(b.clone(), &mut rng).unwrap();
            let mut ba = b;
            ba.merge(a, &mut rng).unwrap();

            prop_assert_eq!(additive(&ab), additive(&ba));
        }
    }
}
