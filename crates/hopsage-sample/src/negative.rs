//! Negative and context sampling for unsupervised objectives.

use hopsage_core::graph::{EdgeType, GraphClient, VertexId, VertexType, WalkParams};
use hopsage_core::ndarray::{s, Array2};
use hopsage_core::{Error, NegativeConfig, RandomWalkConfig, Result};

/// Draws `negative_num` random vertices per seed from a vertex-type pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegativeSampler {
    vertex_type: Vec<VertexType>,
    negative_num: usize,
}

impl NegativeSampler {
    pub fn new(config: &NegativeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            vertex_type: config.vertex_type.clone(),
            negative_num: config.negative_num,
        })
    }

    pub fn negative_num(&self) -> usize {
        self.negative_num
    }

    /// `[batch_size, negative_num]` negatives from a single RPC.
    pub fn sample<C: GraphClient>(&self, client: &mut C, batch_size: usize) -> Result<Array2<VertexId>> {
        let count = batch_size * self.negative_num;
        if count == 0 {
            return Ok(Array2::zeros((batch_size, self.negative_num)));
        }
        let vertices = client.sample_vertices(&self.vertex_type, count)?;
        if vertices.len() != count {
            tracing::warn!(requested = count, got = vertices.len(), "short negative sample");
            return Err(Error::SamplingMsg(format!(
                "requested {} negatives of types {:?}, got {}",
                count,
                self.vertex_type,
                vertices.len()
            )));
        }
        Ok(Array2::from_shape_vec((batch_size, self.negative_num), vertices)?)
    }
}

/// One neighbor per seed over `edge_types`, `[len(seeds), 1]`.
pub fn sample_context<C: GraphClient>(
    client: &mut C,
    seeds: &[VertexId],
    edge_types: &[EdgeType],
) -> Result<Array2<VertexId>> {
    if seeds.is_empty() {
        return Ok(Array2::zeros((0, 1)));
    }
    let response = client.sample_neighbors(seeds, edge_types, 1, false)?;
    if response.is_empty() {
        return Err(Error::Sampling {
            hop: 1,
            parents: seeds.len(),
        });
    }
    if response.ids.dim() != (seeds.len(), 1) {
        return Err(Error::ShapeMismatch(format!(
            "context sample has shape {:?} for {} seeds",
            response.ids.shape(),
            seeds.len()
        )));
    }
    Ok(response.ids)
}

/// Target, context and negative IDs of one contrastive batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContrastiveIds {
    /// `[N, 1]`
    pub target: Array2<VertexId>,
    /// `[N, 1]`
    pub context: Array2<VertexId>,
    /// `[N, negative_num]`
    pub negative: Array2<VertexId>,
}

impl ContrastiveIds {
    pub fn len(&self) -> usize {
        self.target.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn column(ids: &[VertexId]) -> Result<Array2<VertexId>> {
    Ok(Array2::from_shape_vec((ids.len(), 1), ids.to_vec())?)
}

/// Edge batches `(src, dst)`: `src` is the target, `dst` the context.
#[derive(Debug, Clone)]
pub struct EdgeNegTransform {
    negatives: NegativeSampler,
}

impl EdgeNegTransform {
    pub fn new(config: &NegativeConfig) -> Result<Self> {
        Ok(Self {
            negatives: NegativeSampler::new(config)?,
        })
    }

    pub fn transform<C: GraphClient>(&self, client: &mut C, src: &[VertexId], dst: &[VertexId]) -> Result<ContrastiveIds> {
        if src.len() != dst.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} edge sources but {} destinations",
                src.len(),
                dst.len()
            )));
        }
        Ok(ContrastiveIds {
            target: column(src)?,
            context: column(dst)?,
            negative: self.negatives.sample(client, src.len())?,
        })
    }
}

/// Vertex batches: the context is one sampled neighbor of each target.
#[derive(Debug, Clone)]
pub struct NeighborNegTransform {
    edge_types: Vec<EdgeType>,
    negatives: NegativeSampler,
}

impl NeighborNegTransform {
    pub fn new(edge_types: Vec<EdgeType>, config: &NegativeConfig) -> Result<Self> {
        if edge_types.is_empty() {
            return Err(Error::InvalidConfig("context edge_types must be specified".into()));
        }
        Ok(Self {
            edge_types,
            negatives: NegativeSampler::new(config)?,
        })
    }

    pub fn transform<C: GraphClient>(&self, client: &mut C, vertices: &[VertexId]) -> Result<ContrastiveIds> {
        Ok(ContrastiveIds {
            target: column(vertices)?,
            context: sample_context(client, vertices, &self.edge_types)?,
            negative: self.negatives.sample(client, vertices.len())?,
        })
    }
}

/// Vertex batches: (target, context) pairs cut from random walks started
/// at every vertex, DeepWalk when `p == q == 1` and node2vec otherwise.
#[derive(Debug, Clone)]
pub struct RandomWalkNegTransform {
    metapath: Vec<Vec<EdgeType>>,
    params: WalkParams,
    pairs_per_vertex: usize,
    negatives: NegativeSampler,
}

impl RandomWalkNegTransform {
    pub fn new(walk: &RandomWalkConfig, negative: &NegativeConfig) -> Result<Self> {
        walk.validate()?;
        Ok(Self {
            metapath: walk.metapath()?,
            params: walk.params(),
            pairs_per_vertex: walk.pairs_per_vertex()?,
            negatives: NegativeSampler::new(negative)?,
        })
    }

    /// Pairs every input vertex contributes.
    pub fn pairs_per_vertex(&self) -> usize {
        self.pairs_per_vertex
    }

    /// `P = len(vertices) * pairs_per_vertex()` rows per role.
    pub fn transform<C: GraphClient>(&self, client: &mut C, vertices: &[VertexId]) -> Result<ContrastiveIds> {
        let expected = vertices.len() * self.pairs_per_vertex;
        let pairs = if vertices.is_empty() {
            Array2::zeros((0, 2))
        } else {
            client.sample_walk_pairs(vertices, &self.metapath, self.params)?
        };
        if pairs.nrows() == 0 && expected > 0 {
            tracing::warn!(vertices = vertices.len(), "random walk failed");
            return Err(Error::SamplingMsg(format!(
                "random walk over {} steps failed for {} start vertices",
                self.metapath.len(),
                vertices.len()
            )));
        }
        if pairs.dim() != (expected, 2) {
            return Err(Error::ShapeMismatch(format!(
                "walk pairs have shape {:?}, expected [{}, 2]",
                pairs.shape(),
                expected
            )));
        }
        tracing::debug!(vertices = vertices.len(), pairs = expected, "walk pairs sampled");
        Ok(ContrastiveIds {
            target: pairs.slice(s![.., 0..1]).to_owned(),
            context: pairs.slice(s![.., 1..2]).to_owned(),
            negative: self.negatives.sample(client, expected)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopsage_core::{InMemoryGraph, IsolatedPolicy};

    fn graph() -> InMemoryGraph {
        let mut g = InMemoryGraph::new(11);
        for v in 0..6 {
            g.add_vertex(v, (v % 2) as u8);
        }
        g.add_undirected_edge(0, 1, 0, 1.0);
        g.add_undirected_edge(1, 2, 0, 1.0);
        g.add_undirected_edge(2, 3, 1, 1.0);
        g
    }

    #[test]
    fn test_negative_shape_and_pool() {
        let sampler = NegativeSampler::new(&NegativeConfig::new(vec![1], 5)).unwrap();
        let neg = sampler.sample(&mut graph(), 3).unwrap();
        assert_eq!(neg.shape(), &[3, 5]);
        assert!(neg.iter().all(|v| v % 2 == 1));
    }

    #[test]
    fn test_empty_pool_is_a_sampling_error() {
        let sampler = NegativeSampler::new(&NegativeConfig::new(vec![9], 2)).unwrap();
        let err = sampler.sample(&mut graph(), 3).unwrap_err();
        assert!(err.is_sampling());
    }

    #[test]
    fn test_edge_neg() {
        let t = EdgeNegTransform::new(&NegativeConfig::new(vec![0, 1], 4)).unwrap();
        let out = t.transform(&mut graph(), &[0, 1], &[1, 2]).unwrap();
        assert_eq!(out.target.shape(), &[2, 1]);
        assert_eq!(out.context[[1, 0]], 2);
        assert_eq!(out.negative.shape(), &[2, 4]);
        assert!(t.transform(&mut graph(), &[0], &[1, 2]).is_err());
    }

    #[test]
    fn test_neighbor_neg_context_is_a_neighbor() {
        let t = NeighborNegTransform::new(vec![0], &NegativeConfig::new(vec![0], 2)).unwrap();
        let out = t.transform(&mut graph(), &[0, 2]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.context[[0, 0]], 1);
        assert_eq!(out.context[[1, 0]], 1);
        assert_eq!(out.negative.shape(), &[2, 2]);
    }

    #[test]
    fn test_context_failure_propagates() {
        let mut g = graph().with_isolated_policy(IsolatedPolicy::Fail);
        let err = sample_context(&mut g, &[5], &[0]).unwrap_err();
        assert!(matches!(err, Error::Sampling { hop: 1, parents: 1 }));
    }

    fn path(n: i64) -> InMemoryGraph {
        let mut g = InMemoryGraph::new(17);
        for v in 0..n {
            g.add_vertex(v, 0);
        }
        for v in 0..n - 1 {
            g.add_undirected_edge(v, v + 1, 0, 1.0);
        }
        g
    }

    #[test]
    fn test_random_walk_neg_shapes() {
        let walk = RandomWalkConfig::new(vec![0], 3, 2).with_repetition(2);
        let t = RandomWalkNegTransform::new(&walk, &NegativeConfig::new(vec![0], 3)).unwrap();
        assert_eq!(t.pairs_per_vertex(), 2 * 10);

        let out = t.transform(&mut path(8), &[2, 4, 6]).unwrap();
        assert_eq!(out.len(), 3 * 2 * 10);
        assert_eq!(out.target.shape(), &[60, 1]);
        assert_eq!(out.context.shape(), &[60, 1]);
        assert_eq!(out.negative.shape(), &[60, 3]);
        assert!(out.negative.iter().all(|v| (0..8).contains(v)));
    }

    #[test]
    fn test_random_walk_context_window() {
        let walk = RandomWalkConfig::new(vec![0], 4, 2).with_bias(0.5, 2.0);
        let t = RandomWalkNegTransform::new(&walk, &NegativeConfig::new(vec![0], 1)).unwrap();
        let out = t.transform(&mut path(10), &[3, 5]).unwrap();
        for (target, context) in out.target.iter().zip(out.context.iter()) {
            assert!((target - context).abs() <= 2);
        }
        // each walk opens with its start vertex as target
        assert_eq!(out.target[[0, 0]], 3);
        assert_eq!(out.target[[t.pairs_per_vertex(), 0]], 5);
    }

    #[test]
    fn test_random_walk_failure_and_config() {
        let walk = RandomWalkConfig::from_metapath(vec![vec![0], vec![1]], 1);
        let t = RandomWalkNegTransform::new(&walk, &NegativeConfig::new(vec![0], 2)).unwrap();
        let mut g = path(4).with_isolated_policy(IsolatedPolicy::Fail);
        assert!(t.transform(&mut g, &[0]).unwrap_err().is_sampling());
        assert!(t.transform(&mut g, &[]).unwrap().is_empty());

        let unbounded = RandomWalkConfig {
            walk_length: None,
            ..RandomWalkConfig::new(vec![0], 2, 1)
        };
        assert!(RandomWalkNegTransform::new(&unbounded, &NegativeConfig::new(vec![0], 2))
            .unwrap_err()
            .is_config());
    }
}
