use itertools::Itertools;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator as _;
use sprs::{CsMat, TriMat};

/// Struct that represents a graph
#[derive(Debug, Clone)]
pub struct Graph {
    /// The CsMat (from sprs) is used to store the out-edges as a sparse matrix in CSR format.
    /// Row `v` lists the targets of the edges leaving `v`. Entry values carry no meaning.
    pub graph_csr: CsMat<f64>,

    /// Transpose of `graph_csr`, also in CSR format. Row `v` lists the sources of the edges
    /// entering `v`.
    transpose_csr: CsMat<f64>,
}

impl Graph {

    /// Create a new graph
    pub fn new() -> Self {
        Self::from_csr(CsMat::empty(sprs::CSR, 0))
    }

    /// Build a graph from an adjacency matrix. Entry `(u, v)` is an edge from `u` to `v`.
    ///
    /// Panics if the matrix is not square.
    pub fn from_csr(adjacency: CsMat<f64>) -> Self {
        assert_eq!(
            adjacency.rows(),
            adjacency.cols(),
            "adjacency matrix must be square"
        );
        let graph_csr = if adjacency.is_csr() { adjacency } else { adjacency.to_csr() };
        let transpose_csr = graph_csr.transpose_view().to_csr();
        Self {
            graph_csr,
            transpose_csr,
        }
    }

    /// Build a directed graph from an edge list.
    ///
    /// Panics if an endpoint is not below `num_vertices`.
    pub fn from_edges(num_vertices: usize, edges: &[(usize, usize)]) -> Self {
        let mut triplets = TriMat::with_capacity((num_vertices, num_vertices), edges.len());
        for &(source, target) in edges {
            triplets.add_triplet(source, target, 1.0);
        }
        Self::from_csr(triplets.to_csr())
    }

    /// Build a graph where every edge of the list is stored in both directions.
    pub fn undirected_from_edges(num_vertices: usize, edges: &[(usize, usize)]) -> Self {
        let symmetric: Vec<(usize, usize)> = edges
            .iter()
            .flat_map(|&(u, v)| [(u, v), (v, u)])
            .collect();
        Self::from_edges(num_vertices, &symmetric)
    }

    /// The number of vertices in the graph.
    pub fn len(&self) -> usize {
        debug_assert_eq!(self.graph_csr.rows(), self.graph_csr.cols());
        self.graph_csr.rows()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of stored (directed) edges.
    pub fn num_edges(&self) -> usize {
        self.graph_csr.nnz()
    }

    /// Targets of the edges leaving `vertex`, in increasing order.
    pub fn out_neighbors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        row(&self.graph_csr, vertex).iter().copied()
    }

    /// Sources of the edges entering `vertex`, in increasing order.
    pub fn in_neighbors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        row(&self.transpose_csr, vertex).iter().copied()
    }

    /// An iterator over the neighbors of the given vertex in either direction, in increasing
    /// order and without repeats.
    pub fn neighbors(&self, vertex: usize) -> impl Iterator<Item = usize> + '_ {
        self.out_neighbors(vertex)
            .merge(self.in_neighbors(vertex))
            .dedup()
    }

    /// The edge cut of a partition.
    ///
    /// The graph is read as undirected: a pair of vertices joined in one or both directions is a
    /// single edge, and it is cut when its endpoints carry different part IDs. Self loops are
    /// never cut.
    ///
    /// # Example
    ///
    /// A partition with two parts (0 and 1)
    /// ```text,ignore
    ///          0
    ///    1*──┆─*────* 0
    ///    ╱ ╲ ┆╱    ╱
    ///  1*  1*┆ <┈┈╱┈┈┈ Dotted line passes through edges that contribute to edge cut.
    ///    ╲ ╱ ┆   ╱     Here edge_cut = 3
    ///    1*  ┆╲ ╱
    ///          * 0
    /// ```
    pub fn edge_cut(&self, partition: &[usize]) -> usize {
        debug_assert_eq!(self.len(), partition.len());

        (0..self.len())
            .into_par_iter()
            .map(|vertex| {
                let vertex_part = partition[vertex];
                self.neighbors(vertex)
                    .take_while(|&neighbor| neighbor < vertex)
                    .filter(|&neighbor| partition[neighbor] != vertex_part)
                    .count()
            })
            .sum()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

fn row(matrix: &CsMat<f64>, vertex: usize) -> &[usize] {
    let indptr = matrix.indptr().into_raw_storage();
    &matrix.indices()[indptr[vertex]..indptr[vertex + 1]]
}
