use crate::algorithms::{AtomHistogram, AtomId, AtomSelector, Error, GlobalStatistics};
use crate::engine::{Callback, Scope, UpdateFunction};

/// Per-vertex partitioning state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VertexRecord {
    /// Assigned atom, meaningful once `is_set`.
    pub atom_id: AtomId,

    /// Number of times the vertex changed its atom. Never above the update's `max_changes`.
    pub num_changes: usize,

    /// Whether the vertex ever received an atom.
    pub is_set: bool,

    /// Pinned by the seeding process. Seeds never revise their atom but still propagate it.
    pub is_seed: bool,
}

impl VertexRecord {
    pub fn seed(atom_id: AtomId) -> Self {
        Self {
            atom_id,
            num_changes: 0,
            is_set: true,
            is_seed: true,
        }
    }
}

/// Label propagation step run for every scheduled vertex.
///
/// A vertex joins the atom the [`AtomSelector`] picks from its set neighbors and the latest
/// global shares. When it changes, or when it is a seed, it wakes up every neighbor that can
/// still change. A seed leaves neighboring seeds alone. A vertex stops being woken once it used up `max_changes`, which bounds the
/// total work.
#[derive(Debug, Clone, Copy)]
pub struct PartitionUpdate {
    selector: AtomSelector,
    max_changes: usize,
}

impl PartitionUpdate {
    pub fn new(num_atoms: usize, max_changes: usize) -> Self {
        Self {
            selector: AtomSelector::new(num_atoms),
            max_changes,
        }
    }

    pub fn max_changes(&self) -> usize {
        self.max_changes
    }
}

impl UpdateFunction<VertexRecord> for PartitionUpdate {
    type Shared = GlobalStatistics;

    fn update(
        &self,
        scope: &mut Scope<'_, VertexRecord>,
        callback: &mut Callback,
        statistics: &GlobalStatistics,
    ) -> Result<(), Error> {
        // Get the number of neighbor assignments, in and out edges alike
        let mut local_atoms = AtomHistogram::new();
        for neighbor in scope.in_neighbors().chain(scope.out_neighbors()) {
            let ndata = scope.neighbor_vertex_data(neighbor);
            if ndata.is_set {
                *local_atoms.entry(ndata.atom_id).or_insert(0.0) += 1.0;
            }
        }

        let vdata = *scope.vertex_data();

        // No neighbor has an atom yet, try again later.
        if !vdata.is_seed && local_atoms.is_empty() {
            callback.add_task(scope.vertex());
            return Ok(());
        }

        let mut changed = false;
        if !vdata.is_seed {
            let candidate = self.selector.select(&mut local_atoms, &statistics.atom_fractions)?;
            let may_change = vdata.num_changes < self.max_changes && vdata.atom_id != candidate;
            if !vdata.is_set || may_change {
                let record = scope.vertex_data_mut();
                record.atom_id = candidate;
                record.is_set = true;
                record.num_changes += 1;
                changed = true;
            }
        }

        // A seed never changes, so it must not wake another seed or two adjacent seeds would
        // wake each other forever.
        if changed || vdata.is_seed {
            for neighbor in scope.in_neighbors().chain(scope.out_neighbors()) {
                let ndata = scope.neighbor_vertex_data(neighbor);
                if ndata.num_changes < self.max_changes && (changed || !ndata.is_seed) {
                    callback.add_task(neighbor);
                }
            }
        }

        Ok(())
    }
}
