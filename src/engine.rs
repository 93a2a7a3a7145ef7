//! In-process stand-in for a distributed graph engine.
//!
//! Vertices are placed on simulated machines. Every machine owns a FIFO task queue and colors
//! its vertices from a small palette. The engine sweeps the palette color by color. For each
//! color it pulls a batch of pending tasks in which no two tasks are edge-adjacent, runs the
//! batch on the rayon pool against a frozen view of the vertex data, then commits the results
//! in batch order. A registered [`SyncOperation`] folds every vertex into a shared value every
//! `sync_interval` updates. The update function reads that value through an `Arc` until the
//! next fold.

use std::collections::VecDeque;
use std::sync::Arc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::trace;
use crate::algorithms::Error;
use crate::graph::Graph;

pub type VertexId = usize;
pub type MachineId = usize;

const MERGE_STREAM: u64 = u64::MAX;
const COLOR_STREAM: u64 = u64::MAX - 1;

/// Assignment of every vertex to the machine that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    owner: Vec<MachineId>,
    owned: Vec<Vec<VertexId>>,
}

impl Placement {
    /// Split the vertex ids into `num_machines` contiguous blocks of near-equal size.
    pub fn contiguous(num_vertices: usize, num_machines: usize) -> Result<Self, Error> {
        if num_machines == 0 {
            return Err(Error::InvalidParameter("at least one machine is required".to_string()));
        }
        let block = num_vertices.div_ceil(num_machines).max(1);
        let owner = (0..num_vertices).map(|vertex| vertex / block).collect();
        Self::from_owners(owner, num_machines)
    }

    /// Use an explicit owner for every vertex.
    pub fn from_owners(owner: Vec<MachineId>, num_machines: usize) -> Result<Self, Error> {
        if num_machines == 0 {
            return Err(Error::InvalidParameter("at least one machine is required".to_string()));
        }
        let mut owned = vec![Vec::new(); num_machines];
        for (vertex, &machine) in owner.iter().enumerate() {
            if machine >= num_machines {
                return Err(Error::InvalidParameter(format!(
                    "vertex {vertex} placed on machine {machine}, \
                     only {num_machines} machines exist"
                )));
            }
            owned[machine].push(vertex);
        }
        Ok(Self { owner, owned })
    }

    pub fn num_machines(&self) -> usize {
        self.owned.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.owner.len()
    }

    pub fn owner(&self, vertex: VertexId) -> MachineId {
        self.owner[vertex]
    }

    /// The vertices owned by `machine`, in increasing order.
    pub fn owned_vertices(&self, machine: MachineId) -> &[VertexId] {
        &self.owned[machine]
    }
}

/// Read-write view of one vertex plus read-only views of the rest of the graph.
///
/// Writes go to a private copy of the vertex data, which the engine commits after the batch.
/// Neighbor data is what was committed before the batch started.
pub struct Scope<'a, V> {
    vertex: VertexId,
    data: V,
    modified: bool,
    graph: &'a Graph,
    records: &'a [V],
}

impl<'a, V: Copy> Scope<'a, V> {
    pub fn new(vertex: VertexId, graph: &'a Graph, records: &'a [V]) -> Self {
        Self {
            vertex,
            data: records[vertex],
            modified: false,
            graph,
            records,
        }
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn vertex_data(&self) -> &V {
        &self.data
    }

    pub fn vertex_data_mut(&mut self) -> &mut V {
        self.modified = true;
        &mut self.data
    }

    pub fn neighbor_vertex_data(&self, neighbor: VertexId) -> &V {
        &self.records[neighbor]
    }

    pub fn in_neighbors(&self) -> impl Iterator<Item = VertexId> + 'a {
        self.graph.in_neighbors(self.vertex)
    }

    pub fn out_neighbors(&self) -> impl Iterator<Item = VertexId> + 'a {
        self.graph.out_neighbors(self.vertex)
    }

    /// Neighbors in either direction, each listed once.
    pub fn neighbors(&self) -> impl Iterator<Item = VertexId> + 'a {
        self.graph.neighbors(self.vertex)
    }

    fn into_modified(self) -> Option<V> {
        self.modified.then_some(self.data)
    }
}

/// Collects the tasks an update wants scheduled.
#[derive(Debug, Default)]
pub struct Callback {
    tasks: Vec<VertexId>,
}

impl Callback {
    pub fn add_task(&mut self, vertex: VertexId) {
        self.tasks.push(vertex);
    }

    pub fn tasks(&self) -> &[VertexId] {
        &self.tasks
    }
}

/// Per-vertex program run by the engine.
pub trait UpdateFunction<V>: Sync {
    // The shared value the update reads, produced by a `SyncOperation`.
    type Shared: Send + Sync;

    fn update(
        &self,
        scope: &mut Scope<'_, V>,
        callback: &mut Callback,
        shared: &Self::Shared,
    ) -> Result<(), Error>;
}

/// Reduction over all vertices, refreshed periodically while the engine runs.
///
/// Each machine folds its own vertices into a fresh accumulator with `contribute`. The partial
/// accumulators are combined pairwise with `merge`, and `finalize` turns the total into the
/// shared value. `merge` must not depend on the shape of the merge tree for anything callers
/// rely on exactly.
pub trait SyncOperation<V>: Sync {
    type Accumulator: Send;
    type Shared: Send + Sync;

    fn zero(&self) -> Self::Accumulator;

    fn contribute(&self, acc: &mut Self::Accumulator, scope: &Scope<'_, V>, rng: &mut SmallRng);

    fn merge(
        &self,
        acc: &mut Self::Accumulator,
        other: Self::Accumulator,
        rng: &mut SmallRng,
    ) -> Result<(), Error>;

    fn finalize(&self, acc: Self::Accumulator, version: u64) -> Result<Self::Shared, Error>;
}

/// Counters for one call to [`ChromaticEngine::start`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineRun {
    pub sweeps: usize,
    pub updates: usize,
    pub syncs: usize,
}

struct Outcome<V> {
    vertex: VertexId,
    data: Option<V>,
    tasks: Vec<VertexId>,
}

pub struct ChromaticEngine<'g, V, S: SyncOperation<V>> {
    graph: &'g Graph,
    placement: Placement,
    records: Vec<V>,
    colors: Vec<usize>,
    num_colors: usize,
    queues: Vec<VecDeque<VertexId>>,
    queued: Vec<bool>,
    claimed: Vec<bool>,
    sync: S,
    sync_interval: usize,
    steps_since_sync: usize,
    shared: Arc<S::Shared>,
    version: u64,
    seed: u64,
}

impl<'g, V, S> ChromaticEngine<'g, V, S>
where
    V: Copy + Default + Send + Sync,
    S: SyncOperation<V>,
{
    /// Create an engine with default vertex data and a single color.
    ///
    /// The shared value is computed once right away, so updates always have one to read.
    pub fn new(
        graph: &'g Graph,
        placement: Placement,
        sync: S,
        sync_interval: usize,
        seed: u64,
    ) -> Result<Self, Error> {
        if placement.num_vertices() != graph.len() {
            return Err(Error::InputLenMismatch {
                expected: graph.len(),
                actual: placement.num_vertices(),
            });
        }
        if sync_interval == 0 {
            return Err(Error::InvalidParameter("sync interval must be positive".to_string()));
        }

        let num_vertices = graph.len();
        let records = vec![V::default(); num_vertices];
        let shared = aggregate(graph, &placement, &records, &sync, seed, 0)?;
        let queues = vec![VecDeque::new(); placement.num_machines()];

        Ok(Self {
            graph,
            placement,
            records,
            colors: vec![0; num_vertices],
            num_colors: 1,
            queues,
            queued: vec![false; num_vertices],
            claimed: vec![false; num_vertices],
            sync,
            sync_interval,
            steps_since_sync: 0,
            shared: Arc::new(shared),
            version: 0,
            seed,
        })
    }

    /// Give every vertex a random color from `0..num_colors`. Each machine colors only the
    /// vertices it owns.
    pub fn color_randomly(&mut self, num_colors: usize) -> Result<(), Error> {
        if num_colors == 0 {
            return Err(Error::InvalidParameter("at least one color is required".to_string()));
        }
        for machine in 0..self.placement.num_machines() {
            let mut rng =
                SmallRng::seed_from_u64(stream_seed(self.seed, COLOR_STREAM, machine as u64));
            for &vertex in self.placement.owned_vertices(machine) {
                self.colors[vertex] = rng.gen_range(0..num_colors);
            }
        }
        self.num_colors = num_colors;
        Ok(())
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn records(&self) -> &[V] {
        &self.records
    }

    pub fn vertex_data(&self, vertex: VertexId) -> &V {
        &self.records[vertex]
    }

    /// Overwrite the data of a vertex from outside any update, e.g. to pin a seed.
    pub fn set_vertex_data(&mut self, vertex: VertexId, data: V) {
        self.records[vertex] = data;
    }

    pub fn color(&self, vertex: VertexId) -> usize {
        self.colors[vertex]
    }

    pub fn num_colors(&self) -> usize {
        self.num_colors
    }

    /// The latest finalized shared value.
    pub fn shared(&self) -> Arc<S::Shared> {
        Arc::clone(&self.shared)
    }

    /// Number of finalized sync windows so far.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Queue an update for `vertex` on its owner. A vertex is queued at most once.
    pub fn schedule(&mut self, vertex: VertexId) {
        if !self.queued[vertex] {
            self.queued[vertex] = true;
            self.queues[self.placement.owner(vertex)].push_back(vertex);
        }
    }

    /// Number of queued tasks over all machines.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Run queued updates until every queue is empty.
    ///
    /// The shared value is refreshed when the run starts, every `sync_interval` updates, and
    /// once more when the queues drain.
    pub fn start<U>(&mut self, update: &U) -> Result<EngineRun, Error>
    where
        U: UpdateFunction<V, Shared = S::Shared>,
    {
        let mut run = EngineRun::default();
        self.sync()?;
        run.syncs += 1;

        while self.pending() > 0 {
            run.sweeps += 1;
            for color in 0..self.num_colors {
                let batch = self.next_batch(color);
                if batch.is_empty() {
                    continue;
                }

                let outcomes = self.execute(&batch, update);
                for &vertex in &batch {
                    self.claimed[vertex] = false;
                }
                self.commit(outcomes?);

                run.updates += batch.len();
                self.steps_since_sync += batch.len();
                if self.steps_since_sync >= self.sync_interval {
                    self.sync()?;
                    run.syncs += 1;
                }
            }
            trace!(sweep = run.sweeps, pending = self.pending(), "finished sweep");
        }

        self.sync()?;
        run.syncs += 1;
        Ok(run)
    }

    /// Fold every vertex into a fresh accumulator and publish the finalized value.
    pub fn sync(&mut self) -> Result<(), Error> {
        let version = self.version + 1;
        let shared = aggregate(
            self.graph,
            &self.placement,
            &self.records,
            &self.sync,
            self.seed,
            version,
        )?;
        self.shared = Arc::new(shared);
        self.version = version;
        self.steps_since_sync = 0;
        Ok(())
    }

    // Pull the queued tasks of `color` from every machine, skipping any task adjacent to one
    // already taken. Skipped tasks keep their place in the queue.
    fn next_batch(&mut self, color: usize) -> Vec<VertexId> {
        let graph = self.graph;
        let mut batch = Vec::new();

        for machine in 0..self.queues.len() {
            let queue = std::mem::take(&mut self.queues[machine]);
            let mut deferred = VecDeque::with_capacity(queue.len());
            for vertex in queue {
                let free = self.colors[vertex] == color
                    && !graph.neighbors(vertex).any(|neighbor| self.claimed[neighbor]);
                if free {
                    self.claimed[vertex] = true;
                    self.queued[vertex] = false;
                    batch.push(vertex);
                } else {
                    deferred.push_back(vertex);
                }
            }
            self.queues[machine] = deferred;
        }

        batch
    }

    fn execute<U>(&self, batch: &[VertexId], update: &U) -> Result<Vec<Outcome<V>>, Error>
    where
        U: UpdateFunction<V, Shared = S::Shared>,
    {
        let graph = self.graph;
        let records = &self.records;
        let shared = &*self.shared;

        batch
            .par_iter()
            .map(|&vertex| {
                let mut scope = Scope::new(vertex, graph, records);
                let mut callback = Callback::default();
                update.update(&mut scope, &mut callback, shared)?;
                Ok(Outcome {
                    vertex,
                    data: scope.into_modified(),
                    tasks: callback.tasks,
                })
            })
            .collect()
    }

    fn commit(&mut self, outcomes: Vec<Outcome<V>>) {
        for outcome in outcomes {
            if let Some(data) = outcome.data {
                self.records[outcome.vertex] = data;
            }
            for task in outcome.tasks {
                self.schedule(task);
            }
        }
    }
}

fn aggregate<V, S>(
    graph: &Graph,
    placement: &Placement,
    records: &[V],
    sync: &S,
    seed: u64,
    version: u64,
) -> Result<S::Shared, Error>
where
    V: Copy + Send + Sync,
    S: SyncOperation<V>,
{
    let partials: Vec<S::Accumulator> = (0..placement.num_machines())
        .into_par_iter()
        .map(|machine| {
            let mut rng = SmallRng::seed_from_u64(stream_seed(seed, version, machine as u64));
            let mut acc = sync.zero();
            for &vertex in placement.owned_vertices(machine) {
                let scope = Scope::new(vertex, graph, records);
                sync.contribute(&mut acc, &scope, &mut rng);
            }
            acc
        })
        .collect();

    // Fixed pairwise tree over the machines, so a given seed always merges the same way.
    let mut rng = SmallRng::seed_from_u64(stream_seed(seed, version, MERGE_STREAM));
    let mut level = partials;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut partials = level.into_iter();
        while let Some(mut left) = partials.next() {
            if let Some(right) = partials.next() {
                sync.merge(&mut left, right, &mut rng)?;
            }
            next.push(left);
        }
        level = next;
    }

    let total = match level.pop() {
        Some(total) => total,
        None => sync.zero(),
    };
    sync.finalize(total, version)
}

fn stream_seed(seed: u64, version: u64, stream: u64) -> u64 {
    seed ^ version.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ stream.wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}
