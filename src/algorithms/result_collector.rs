use rayon::prelude::*;
use crate::algorithms::{AtomId, Error, PartitionEngine};
use crate::engine::{MachineId, VertexId};
use crate::imbalance::compute_imbalance_from_part_loads;

/// Final atom and owning machine of every vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    /// Atom of vertex `i`.
    pub atoms: Vec<AtomId>,
    /// Machine that owned vertex `i` during the run.
    pub machines: Vec<MachineId>,
    /// Number of vertices per atom.
    pub counts: Vec<usize>,
}

impl PartitionResult {
    pub fn num_atoms(&self) -> usize {
        self.counts.len()
    }

    /// Largest atom relative to a perfectly even split. 1.0 is perfect balance.
    pub fn imbalance(&self) -> f64 {
        compute_imbalance_from_part_loads(self.num_atoms(), &self.counts)
    }
}

/// Gather the partitioning from a converged engine.
///
/// Every machine reports `(vertex, atom)` for the vertices it owns, then the reports are
/// written into dense vectors. Fails if any vertex was left unset.
pub fn collect_partitioning(
    engine: &PartitionEngine<'_>,
    num_atoms: usize,
) -> Result<PartitionResult, Error> {
    let placement = engine.placement();
    let records = engine.records();

    let reports = (0..placement.num_machines())
        .into_par_iter()
        .map(|machine| {
            placement
                .owned_vertices(machine)
                .iter()
                .map(|&vertex| {
                    let record = &records[vertex];
                    if !record.is_set {
                        return Err(Error::UnsetVertex { vertex, machine });
                    }
                    Ok((vertex, record.atom_id))
                })
                .collect::<Result<Vec<_>, Error>>()
        })
        .collect::<Result<Vec<_>, Error>>()?;

    gather(reports, records.len(), num_atoms)
}

fn gather(
    reports: Vec<Vec<(VertexId, AtomId)>>,
    num_vertices: usize,
    num_atoms: usize,
) -> Result<PartitionResult, Error> {
    let mut atoms = vec![0; num_vertices];
    let mut machines = vec![0; num_vertices];
    let mut counts = vec![0; num_atoms];

    for (machine, report) in reports.into_iter().enumerate() {
        for (vertex, atom) in report {
            if atom >= num_atoms {
                return Err(Error::AtomOutOfRange { atom, num_atoms });
            }
            atoms[vertex] = atom;
            machines[vertex] = machine;
            counts[atom] += 1;
        }
    }

    Ok(PartitionResult { atoms, machines, counts })
}
