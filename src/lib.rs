// This file has code from https://github.com/LIHPC-Computational-Geometry/coupe
pub mod graph;
pub mod imbalance;
pub mod io;
pub mod engine;
pub mod algorithms;

// The `Partition` trait allows for partitioning data.
// Partitioning algorithms implement this trait.
// The generic argument `M` defines the input of the algorithms (e.g. a
// graph held by reference).
// The input partition must be of the correct size and its contents may or may
// not be used by the algorithms.
pub trait Partition<M> {
    // Diagnostic data returned for a specific run of the algorithm.
    type Metadata;

    // Error details, should the algorithm fail to run.
    type Error;

    // Partition the given data and output the atom of each vertex in
    // `part_ids`.
    //
    // Atoms are contiguous and start from zero. An atom that does not appear
    // in the array is empty.
    fn partition(&mut self, part_ids: &mut [usize], data: M)
                 -> Result<Self::Metadata, Self::Error>;
}
