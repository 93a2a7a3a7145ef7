use std::collections::BTreeMap;
use crate::algorithms::{AtomId, Error};

/// Neighbor count per atom. Iterates in increasing atom id order.
pub type AtomHistogram = BTreeMap<AtomId, f64>;

/// Picks the atom a vertex should join.
///
/// A pure majority vote would pull every undecided vertex into the globally largest atom.
/// Instead each local share is divided by the atom's global share, so an atom that is strong
/// around the vertex but small overall wins. An atom with no global members is joined on
/// sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomSelector {
    pub num_atoms: usize,
}

impl AtomSelector {
    pub fn new(num_atoms: usize) -> Self {
        Self { num_atoms }
    }

    /// Normalize `local` in place and return the best scoring atom.
    ///
    /// `global` maps atoms to their share of all assigned vertices; atoms without members are
    /// absent. Ties keep the atom seen first, i.e. the smallest id.
    pub fn select(
        &self,
        local: &mut AtomHistogram,
        global: &BTreeMap<AtomId, f64>,
    ) -> Result<AtomId, Error> {
        let first_atom = match local.keys().next() {
            Some(&atom) => atom,
            None => return Err(Error::EmptyHistogram),
        };

        let sum: f64 = local.values().sum();
        if !(sum > 0.0) {
            return Err(Error::NonPositiveNormalization { sum });
        }
        for share in local.values_mut() {
            *share /= sum;
        }

        let mut best_atom = first_atom;
        let mut best_score = 0.0;
        for (&atom, &local_share) in local.iter() {
            if atom >= self.num_atoms {
                return Err(Error::AtomOutOfRange { atom, num_atoms: self.num_atoms });
            }

            let global_share = match global.get(&atom) {
                Some(&share) => share,
                // auto join
                None => return Ok(atom),
            };
            if !(global_share > 0.0) {
                return Err(Error::ZeroGlobalShare { atom, share: global_share });
            }

            let score = local_share / global_share;
            if score > best_score {
                best_atom = atom;
                best_score = score;
            }
        }

        Ok(best_atom)
    }
}
