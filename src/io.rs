use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use sprs::io::{read_matrix_market, IoError};
use sprs::num_kinds::Pattern;
use sprs::TriMat;
use crate::graph::Graph;

/// Read a matrix market file and output Graph struct.
///
/// Entry `(i, j)` of the matrix becomes an edge from vertex `i` to vertex `j`. Only the
/// structure is read, so pattern, integer and real files are all accepted. Symmetric files
/// yield both directions.
pub fn read_matrix_market_as_graph(file_path: &Path) -> Result<Graph, IoError> {
    let structure = read_matrix_market::<Pattern, usize, _>(file_path)?;

    // An adjacency matrix has to be square.
    if structure.rows() != structure.cols() {
        return Err(IoError::BadMatrixMarketFile);
    }

    let mut tri_matrix = TriMat::with_capacity(structure.shape(), structure.nnz());
    for (&row, &col) in structure.row_inds().iter().zip(structure.col_inds()) {
        tri_matrix.add_triplet(row, col, 1.0);
    }

    Ok(Graph::from_csr(tri_matrix.to_csr()))
}

/// Path of the file listing the owning machine of every vertex: `machine_` followed by the
/// partition file name, in the same directory.
pub fn machine_file_path(partition_file: &Path) -> PathBuf {
    let file_name = partition_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    partition_file.with_file_name(format!("machine_{file_name}"))
}

/// Write the partition array to a file, one atom id per line in vertex order.
pub fn write_partition_data_to_file(partition: &[usize], file_name: &Path) -> std::io::Result<()> {
    write_lines(partition, file_name)
}

/// Write the owning machine of every vertex, one machine id per line in vertex order.
pub fn write_machine_data_to_file(machines: &[usize], file_name: &Path) -> std::io::Result<()> {
    write_lines(machines, file_name)
}

fn write_lines(values: &[usize], file_name: &Path) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(file_name)?);
    for value in values {
        writeln!(file, "{}", value)?;
    }
    file.flush()
}
