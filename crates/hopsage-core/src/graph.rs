//! Graph-serving and feature-store contracts.
//!
//! The sampling pipeline never touches graph storage directly. It talks to
//! two collaborators:
//!
//! - [`GraphClient`]: fixed-count neighbor sampling, vertex sampling and
//!   random-walk pair sampling.
//! - [`FeatureStore`]: named per-vertex feature lookup.
//!
//! Both take `&mut self`: a client connection belongs to exactly one data
//! loading worker and is never shared between threads. Implementations only
//! need to be `Send` so a worker can own one.
//!
//! [`InMemoryGraph`] implements both traits over an in-process typed graph
//! and is what the tests and single-process loaders use.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Vertex identifier as served by the graph engine.
pub type VertexId = i64;

/// Edge type tag.
pub type EdgeType = u8;

/// Vertex type tag.
pub type VertexType = u8;

/// Response of a neighbor-sampling RPC.
///
/// `ids` has shape `[len(request), count]`; `weights`, when requested, has
/// the same shape. Zero rows signal a failed call.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborSample {
    pub ids: Array2<VertexId>,
    pub weights: Option<Array2<f32>>,
}

impl NeighborSample {
    /// An empty (failed) response.
    pub fn empty() -> Self {
        Self {
            ids: Array2::zeros((0, 0)),
            weights: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.nrows() == 0
    }
}

/// Node2vec walk parameters of a pair-sampling request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkParams {
    /// Walks started from every requested vertex.
    pub repetition: usize,
    /// Largest step distance between a target and its context.
    pub context_size: usize,
    /// Return parameter: a step back to the previous vertex is weighted `1/p`.
    pub p: f32,
    /// In-out parameter: a step away from the previous vertex is weighted `1/q`.
    pub q: f32,
}

impl WalkParams {
    /// `p == q == 1` walks are plain weighted (DeepWalk) walks.
    pub fn is_unbiased(&self) -> bool {
        (self.p - 1.0).abs() < f32::EPSILON && (self.q - 1.0).abs() < f32::EPSILON
    }

    pub fn validate(&self) -> Result<()> {
        if self.repetition == 0 {
            return Err(Error::InvalidConfig("walk repetition must be positive".into()));
        }
        if self.context_size == 0 {
            return Err(Error::InvalidConfig("context_size must be positive".into()));
        }
        for (name, value) in [("walk_p", self.p), ("walk_q", self.q)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Pairs cut from one walk of `walk_length` steps (`walk_length + 1` vertices).
pub fn walk_pair_count(walk_length: usize, context_size: usize) -> usize {
    (0..=walk_length)
        .map(|i| context_size.min(walk_length - i) + context_size.min(i))
        .sum()
}

/// Cut walks `[num_walks, walk_length + 1]` into `[P, 2]` (target, context)
/// pairs.
///
/// Walks are emitted in row order. Within a walk every position pairs with
/// the vertices up to `context_size` steps to its right, nearest first, then
/// with those to its left.
pub fn walk_pairs(walks: ArrayView2<'_, VertexId>, context_size: usize) -> Result<Array2<VertexId>> {
    let len = walks.ncols();
    let per_walk = walk_pair_count(len.saturating_sub(1), context_size);
    let mut flat = Vec::with_capacity(walks.nrows() * per_walk * 2);
    for walk in walks.outer_iter() {
        for i in 0..len {
            for r in 1..=context_size.min(len - 1 - i) {
                flat.extend([walk[i], walk[i + r]]);
            }
            for l in 1..=context_size.min(i) {
                flat.extend([walk[i], walk[i - l]]);
            }
        }
    }
    let rows = flat.len() / 2;
    Ok(Array2::from_shape_vec((rows, 2), flat)?)
}

/// Client of the graph-serving engine.
pub trait GraphClient: Send {
    /// Sample `count` neighbors (with replacement) for each of `ids`, along
    /// any of `edge_types`.
    fn sample_neighbors(
        &mut self,
        ids: &[VertexId],
        edge_types: &[EdgeType],
        count: usize,
        with_weight: bool,
    ) -> Result<NeighborSample>;

    /// Sample `count` vertices uniformly from the pools of `vertex_types`.
    fn sample_vertices(&mut self, vertex_types: &[VertexType], count: usize) -> Result<Vec<VertexId>>;

    /// Walk `metapath` (one step per entry) `params.repetition` times from
    /// each of `ids` and cut the walks into `[P, 2]` pairs with
    /// [`walk_pairs`]. Walks are ordered repetition-major. Zero rows signal
    /// a failed call.
    fn sample_walk_pairs(
        &mut self,
        ids: &[VertexId],
        metapath: &[Vec<EdgeType>],
        params: WalkParams,
    ) -> Result<Array2<VertexId>>;
}

/// Client of the feature store.
///
/// Each method returns one `[len(ids), dims[i]]` array per requested name.
/// An empty vector signals an unknown name or an out-of-range ID.
pub trait FeatureStore: Send {
    fn dense_features(&mut self, ids: &[VertexId], names: &[String], dims: &[usize]) -> Result<Vec<Array2<f32>>>;

    fn sparse_features(&mut self, ids: &[VertexId], names: &[String], dims: &[usize]) -> Result<Vec<Array2<i64>>>;
}

impl<T: GraphClient + ?Sized> GraphClient for &mut T {
    fn sample_neighbors(
        &mut self,
        ids: &[VertexId],
        edge_types: &[EdgeType],
        count: usize,
        with_weight: bool,
    ) -> Result<NeighborSample> {
        (**self).sample_neighbors(ids, edge_types, count, with_weight)
    }

    fn sample_vertices(&mut self, vertex_types: &[VertexType], count: usize) -> Result<Vec<VertexId>> {
        (**self).sample_vertices(vertex_types, count)
    }

    fn sample_walk_pairs(
        &mut self,
        ids: &[VertexId],
        metapath: &[Vec<EdgeType>],
        params: WalkParams,
    ) -> Result<Array2<VertexId>> {
        (**self).sample_walk_pairs(ids, metapath, params)
    }
}

impl<T: FeatureStore + ?Sized> FeatureStore for &mut T {
    fn dense_features(&mut self, ids: &[VertexId], names: &[String], dims: &[usize]) -> Result<Vec<Array2<f32>>> {
        (**self).dense_features(ids, names, dims)
    }

    fn sparse_features(&mut self, ids: &[VertexId], names: &[String], dims: &[usize]) -> Result<Vec<Array2<i64>>> {
        (**self).sparse_features(ids, names, dims)
    }
}

/// What [`InMemoryGraph`] does for a vertex with no neighbor of the
/// requested edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolatedPolicy {
    /// Pad every slot with the vertex itself.
    #[default]
    SelfLoop,
    /// Fail the whole call with an empty response.
    Fail,
}

#[derive(Debug, Clone, Default)]
struct Adjacency {
    neighbors: Vec<VertexId>,
    weights: Vec<f32>,
}

/// In-process typed, weighted graph with vertex features.
///
/// Sampling is with replacement, proportional to edge weight, and
/// reproducible from the seed.
#[derive(Debug, Clone)]
pub struct InMemoryGraph {
    adjacency: HashMap<(VertexId, EdgeType), Adjacency>,
    vertex_pools: HashMap<VertexType, Vec<VertexId>>,
    dense: HashMap<String, HashMap<VertexId, Vec<f32>>>,
    sparse: HashMap<String, HashMap<VertexId, Vec<i64>>>,
    isolated: IsolatedPolicy,
    rng: XorShiftRng,
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new(42)
    }
}

impl InMemoryGraph {
    /// Create an empty graph whose sampler is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            adjacency: HashMap::new(),
            vertex_pools: HashMap::new(),
            dense: HashMap::new(),
            sparse: HashMap::new(),
            isolated: IsolatedPolicy::default(),
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }

    pub fn with_isolated_policy(mut self, policy: IsolatedPolicy) -> Self {
        self.isolated = policy;
        self
    }

    /// Independent copy with its own sampler state, for another worker.
    pub fn fork(&self, seed: u64) -> Self {
        let mut graph = self.clone();
        graph.rng = XorShiftRng::seed_from_u64(seed);
        graph
    }

    /// Register a vertex in the pool of `vertex_type`.
    pub fn add_vertex(&mut self, id: VertexId, vertex_type: VertexType) {
        let pool = self.vertex_pools.entry(vertex_type).or_default();
        if !pool.contains(&id) {
            pool.push(id);
        }
    }

    /// Add a directed edge `src -> dst` of `edge_type` with `weight`.
    pub fn add_edge(&mut self, src: VertexId, dst: VertexId, edge_type: EdgeType, weight: f32) {
        let adj = self.adjacency.entry((src, edge_type)).or_default();
        adj.neighbors.push(dst);
        adj.weights.push(weight);
    }

    /// Add both directions of an edge.
    pub fn add_undirected_edge(&mut self, a: VertexId, b: VertexId, edge_type: EdgeType, weight: f32) {
        self.add_edge(a, b, edge_type, weight);
        self.add_edge(b, a, edge_type, weight);
    }

    pub fn set_dense_feature(&mut self, name: impl Into<String>, id: VertexId, values: Vec<f32>) {
        self.dense.entry(name.into()).or_default().insert(id, values);
    }

    pub fn set_sparse_feature(&mut self, name: impl Into<String>, id: VertexId, values: Vec<i64>) {
        self.sparse.entry(name.into()).or_default().insert(id, values);
    }

    /// Number of directed edges of any type.
    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(|a| a.neighbors.len()).sum()
    }

    fn candidates(&self, id: VertexId, edge_types: &[EdgeType]) -> (Vec<VertexId>, Vec<f32>) {
        let mut neighbors = Vec::new();
        let mut weights = Vec::new();
        for &et in edge_types {
            if let Some(adj) = self.adjacency.get(&(id, et)) {
                neighbors.extend_from_slice(&adj.neighbors);
                weights.extend_from_slice(&adj.weights);
            }
        }
        (neighbors, weights)
    }

    fn pick(&mut self, id: VertexId, neighbors: &[VertexId], weights: &[f32]) -> Result<VertexId> {
        let dist = WeightedIndex::new(weights).map_err(|e| {
            Error::SamplingMsg(format!("invalid edge weights for vertex {}: {}", id, e))
        })?;
        Ok(neighbors[dist.sample(&mut self.rng)])
    }

    /// One walk from `start`, `metapath.len()` steps. `None` when a step
    /// hits an isolated vertex under [`IsolatedPolicy::Fail`].
    fn walk(&mut self, start: VertexId, metapath: &[Vec<EdgeType>], params: WalkParams) -> Result<Option<Vec<VertexId>>> {
        let unbiased = params.is_unbiased();
        let mut walk = Vec::with_capacity(metapath.len() + 1);
        walk.push(start);
        let mut curr = start;
        let mut prev: Option<(VertexId, HashSet<VertexId>)> = None;

        for edge_types in metapath {
            let (neighbors, mut weights) = self.candidates(curr, edge_types);
            if neighbors.is_empty() {
                match self.isolated {
                    IsolatedPolicy::SelfLoop => {
                        walk.push(curr);
                        prev = Some((curr, HashSet::new()));
                        continue;
                    }
                    IsolatedPolicy::Fail => {
                        tracing::debug!(vertex = curr, ?edge_types, "walk stuck, failing call");
                        return Ok(None);
                    }
                }
            }
            if let (false, Some((back, around))) = (unbiased, &prev) {
                for (w, x) in weights.iter_mut().zip(&neighbors) {
                    if x == back {
                        *w /= params.p;
                    } else if !around.contains(x) {
                        *w /= params.q;
                    }
                }
            }
            let next = self.pick(curr, &neighbors, &weights)?;
            walk.push(next);
            prev = Some((curr, neighbors.into_iter().collect()));
            curr = next;
        }
        Ok(Some(walk))
    }
}

impl GraphClient for InMemoryGraph {
    fn sample_neighbors(
        &mut self,
        ids: &[VertexId],
        edge_types: &[EdgeType],
        count: usize,
        with_weight: bool,
    ) -> Result<NeighborSample> {
        let mut out_ids = Array2::zeros((ids.len(), count));
        let mut out_weights = Array2::zeros((ids.len(), count));
        for (row, &id) in ids.iter().enumerate() {
            let (neighbors, weights) = self.candidates(id, edge_types);
            if neighbors.is_empty() {
                match self.isolated {
                    IsolatedPolicy::SelfLoop => {
                        out_ids.row_mut(row).fill(id);
                        out_weights.row_mut(row).fill(1.0);
                        continue;
                    }
                    IsolatedPolicy::Fail => {
                        tracing::debug!(vertex = id, ?edge_types, "no neighbors, failing call");
                        return Ok(NeighborSample::empty());
                    }
                }
            }
            let dist = WeightedIndex::new(&weights).map_err(|e| {
                Error::SamplingMsg(format!("invalid edge weights for vertex {}: {}", id, e))
            })?;
            for col in 0..count {
                let pick = dist.sample(&mut self.rng);
                out_ids[[row, col]] = neighbors[pick];
                out_weights[[row, col]] = weights[pick];
            }
        }
        Ok(NeighborSample {
            ids: out_ids,
            weights: with_weight.then_some(out_weights),
        })
    }

    fn sample_vertices(&mut self, vertex_types: &[VertexType], count: usize) -> Result<Vec<VertexId>> {
        let pool: Vec<VertexId> = vertex_types
            .iter()
            .filter_map(|t| self.vertex_pools.get(t))
            .flatten()
            .copied()
            .collect();
        if pool.is_empty() {
            return Ok(Vec::new());
        }
        Ok((0..count)
            .map(|_| pool[self.rng.gen_range(0..pool.len())])
            .collect())
    }

    fn sample_walk_pairs(
        &mut self,
        ids: &[VertexId],
        metapath: &[Vec<EdgeType>],
        params: WalkParams,
    ) -> Result<Array2<VertexId>> {
        params.validate()?;
        if metapath.is_empty() || metapath.iter().any(Vec::is_empty) {
            return Err(Error::InvalidConfig("walk metapath needs edge types at every step".into()));
        }
        let len = metapath.len() + 1;
        let mut walks = Array2::zeros((ids.len() * params.repetition, len));
        let starts = (0..params.repetition).flat_map(|_| ids.iter().copied());
        for (mut row, start) in walks.outer_iter_mut().zip(starts) {
            let Some(walk) = self.walk(start, metapath, params)? else {
                return Ok(Array2::zeros((0, 2)));
            };
            for (slot, v) in row.iter_mut().zip(walk) {
                *slot = v;
            }
        }
        let pairs = walk_pairs(walks.view(), params.context_size)?;
        tracing::debug!(walks = walks.nrows(), pairs = pairs.nrows(), "sampled walk pairs");
        Ok(pairs)
    }
}

fn lookup<T: Copy + Default>(
    table: &HashMap<String, HashMap<VertexId, Vec<T>>>,
    ids: &[VertexId],
    names: &[String],
    dims: &[usize],
) -> Vec<Array2<T>> {
    if names.len() != dims.len() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(names.len());
    for (name, &dim) in names.iter().zip(dims) {
        let Some(column) = table.get(name) else {
            tracing::debug!(feature = %name, "unknown feature name");
            return Vec::new();
        };
        let mut block = Array2::from_elem((ids.len(), dim), T::default());
        for (row, id) in ids.iter().enumerate() {
            match column.get(id) {
                Some(values) if values.len() == dim => {
                    for (slot, &v) in block.row_mut(row).iter_mut().zip(values) {
                        *slot = v;
                    }
                }
                Some(values) => {
                    tracing::debug!(feature = %name, vertex = id, stored = values.len(), dim, "feature width mismatch");
                    return Vec::new();
                }
                None => {
                    tracing::debug!(feature = %name, vertex = id, "no feature value for vertex");
                    return Vec::new();
                }
            }
        }
        out.push(block);
    }
    out
}

impl FeatureStore for InMemoryGraph {
    /// Every requested vertex must hold a value of exactly `dim` entries for
    /// every name; otherwise the response is empty.
    fn dense_features(&mut self, ids: &[VertexId], names: &[String], dims: &[usize]) -> Result<Vec<Array2<f32>>> {
        Ok(lookup(&self.dense, ids, names, dims))
    }

    fn sparse_features(&mut self, ids: &[VertexId], names: &[String], dims: &[usize]) -> Result<Vec<Array2<i64>>> {
        Ok(lookup(&self.sparse, ids, names, dims))
    }
}
