//! End-to-end sampling pipelines.
//!
//! A pipeline owns a validated configuration and turns a seed batch into
//! model inputs: sample, attach features, structure. The supervised variant
//! adds labels; the unsupervised variant runs the same pipeline three times
//! (targets, contexts, negatives) so all three share one input contract.

use crate::bipartite::{to_bipartite, BipartiteLayer};
use crate::feature::{fetch_labels, FeatureSpec, HopFeatures};
use crate::multi_hop::MultiHopSampler;
use crate::negative::{ContrastiveIds, NeighborNegTransform};
use crate::relation::{relation_from_indices, to_relation, RelationGraph, RelationIndices};
use hopsage_core::graph::{FeatureStore, GraphClient, VertexId};
use hopsage_core::ndarray::{Array2, ArrayD, IxDyn};
use hopsage_core::{Encoding, Error, LabelConfig, PipelineConfig, Result};

/// Relation graph plus features stored once per unique vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationBatch {
    pub graph: RelationGraph,
    /// `[U, D]`
    pub dense: Option<Array2<f32>>,
    /// `[U, S]`
    pub sparse: Option<Array2<i64>>,
}

/// Structured output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Structured {
    /// Deepest hop first.
    Bipartite(Vec<BipartiteLayer>),
    Relation(RelationBatch),
}

/// Number of seed axes plus field names and their shapes past those axes.
///
/// Two batches with equal signatures can be fed to the same model; they
/// may still differ in the sizes of the seed (group) dimensions, never in
/// their count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub seed_rank: usize,
    pub fields: Vec<(String, Vec<usize>)>,
}

fn trailing(shape: &[usize], seed_rank: usize) -> Vec<usize> {
    shape.get(seed_rank..).map(<[usize]>::to_vec).unwrap_or_default()
}

impl Structured {
    pub fn signature(&self) -> Signature {
        let mut fields = Vec::new();
        let seed_rank = match self {
            Structured::Bipartite(layers) => {
                for (i, layer) in layers.iter().enumerate() {
                    let seed_rank = layer.src.ndim() - 1;
                    let mut push = |name: &str, shape: &[usize]| {
                        fields.push((format!("layer{}.{}", i, name), trailing(shape, seed_rank)));
                    };
                    push("src", layer.src.shape());
                    push("dst", layer.dst.shape());
                    if let (Some(s), Some(d)) = (&layer.src_dense, &layer.dst_dense) {
                        push("src_dense", s.shape());
                        push("dst_dense", d.shape());
                    }
                    if let (Some(s), Some(d)) = (&layer.src_sparse, &layer.dst_sparse) {
                        push("src_sparse", s.shape());
                        push("dst_sparse", d.shape());
                    }
                    if let Some(w) = &layer.edge_weight {
                        push("edge_weight", w.shape());
                    }
                }
                layers.first().map_or(0, |layer| layer.src.ndim() - 1)
            }
            Structured::Relation(batch) => {
                let g = &batch.graph;
                fields.push(("ids".to_string(), Vec::new()));
                fields.push(("relation_indices".to_string(), vec![2]));
                if g.relation_weight.is_some() {
                    fields.push(("relation_weight".to_string(), vec![1]));
                }
                fields.push(("target_indices".to_string(), Vec::new()));
                if let Some(d) = &batch.dense {
                    fields.push(("dense".to_string(), vec![d.ncols()]));
                }
                if let Some(s) = &batch.sparse {
                    fields.push(("sparse".to_string(), vec![s.ncols()]));
                }
                g.target_indices.ndim()
            }
        };
        Signature { seed_rank, fields }
    }

    /// Field names in signature order.
    pub fn fields(&self) -> Vec<String> {
        self.signature().fields.into_iter().map(|(name, _)| name).collect()
    }

    pub fn as_bipartite(&self) -> Option<&[BipartiteLayer]> {
        match self {
            Structured::Bipartite(layers) => Some(layers),
            Structured::Relation(_) => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationBatch> {
        match self {
            Structured::Relation(batch) => Some(batch),
            Structured::Bipartite(_) => None,
        }
    }
}

/// Sample, attach features and structure one seed batch.
#[derive(Debug, Clone)]
pub struct SamplingPipeline {
    sampler: MultiHopSampler,
    features: Option<FeatureSpec>,
    encoding: Encoding,
}

impl SamplingPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sampler: MultiHopSampler::new(&config.multi_hop)?,
            features: config.features.as_ref().map(FeatureSpec::new).transpose()?,
            encoding: config.encoding,
        })
    }

    pub fn sampler(&self) -> &MultiHopSampler {
        &self.sampler
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Run over a seed tensor of any shape.
    pub fn run<G>(&self, graph: &mut G, seeds: &ArrayD<VertexId>) -> Result<Structured>
    where
        G: GraphClient + FeatureStore,
    {
        let sample = self.sampler.sample(graph, seeds)?;
        let profile = self.sampler.profile();

        match self.encoding {
            Encoding::Bipartite => {
                let hop = match &self.features {
                    Some(spec) => spec.attach(graph, sample)?,
                    None => HopFeatures::from(sample),
                };
                Ok(Structured::Bipartite(to_bipartite(profile, &hop)?))
            }
            Encoding::Relation(options) => {
                let Some(spec) = &self.features else {
                    let relation = to_relation(profile, &sample.ids, sample.edge_weight.as_ref(), options)?;
                    return Ok(Structured::Relation(RelationBatch {
                        graph: relation,
                        dense: None,
                        sparse: None,
                    }));
                };
                let hop = spec.attach_sparse(graph, sample)?;
                let RelationIndices {
                    relation_indices,
                    relation_weight,
                    target_indices,
                } = relation_from_indices(profile, &hop.indices, hop.edge_weight.as_ref(), options)?;
                Ok(Structured::Relation(RelationBatch {
                    graph: RelationGraph {
                        unique_ids: hop.ids,
                        relation_indices,
                        relation_weight,
                        target_indices,
                    },
                    dense: hop.dense,
                    sparse: hop.sparse,
                }))
            }
        }
    }

    /// Run over a flat seed list.
    pub fn run_ids<G>(&self, graph: &mut G, seeds: &[VertexId]) -> Result<Structured>
    where
        G: GraphClient + FeatureStore,
    {
        let seeds = ArrayD::from_shape_vec(IxDyn(&[seeds.len()]), seeds.to_vec())?;
        self.run(graph, &seeds)
    }
}

/// Structured inputs plus `[N, label_dim]` labels of the seeds.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledBatch {
    pub inputs: Structured,
    pub labels: Array2<f32>,
}

#[derive(Debug, Clone)]
pub struct SupervisedPipeline {
    inner: SamplingPipeline,
    label: LabelConfig,
}

impl SupervisedPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let label = config
            .label
            .clone()
            .ok_or_else(|| Error::InvalidConfig("supervised pipeline needs a label config".into()))?;
        Ok(Self {
            inner: SamplingPipeline::new(config)?,
            label,
        })
    }

    pub fn run<G>(&self, graph: &mut G, seeds: &[VertexId]) -> Result<LabeledBatch>
    where
        G: GraphClient + FeatureStore,
    {
        let inputs = self.inner.run_ids(graph, seeds)?;
        let labels = fetch_labels(graph, &self.label, seeds)?;
        Ok(LabeledBatch { inputs, labels })
    }
}

/// Structured target, context and negative inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ContrastiveBatch {
    pub ids: ContrastiveIds,
    /// Seeds as `[N, 1]`.
    pub target: Structured,
    /// One neighbor per seed as `[N, 1]`.
    pub context: Structured,
    /// `[N, negative_num]`
    pub negative: Structured,
}

/// Unsupervised pipeline: contexts come from `metapath[0]`, negatives from
/// the configured vertex-type pool.
#[derive(Debug, Clone)]
pub struct UnsupervisedPipeline {
    inner: SamplingPipeline,
    transform: NeighborNegTransform,
}

impl UnsupervisedPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let negative = config
            .negative
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("unsupervised pipeline needs a negative config".into()))?;
        let inner = SamplingPipeline::new(config)?;
        let context_types = inner.sampler().metapath()[0].clone();
        Ok(Self {
            transform: NeighborNegTransform::new(context_types, negative)?,
            inner,
        })
    }

    pub fn run<G>(&self, graph: &mut G, seeds: &[VertexId]) -> Result<ContrastiveBatch>
    where
        G: GraphClient + FeatureStore,
    {
        let ids = self.transform.transform(graph, seeds)?;
        let target = self.inner.run(graph, &ids.target.clone().into_dyn())?;
        let context = self.inner.run(graph, &ids.context.clone().into_dyn())?;
        let negative = self.inner.run(graph, &ids.negative.clone().into_dyn())?;

        let expected = target.signature();
        for (role, batch) in [("context", &context), ("negative", &negative)] {
            if batch.signature() != expected {
                return Err(Error::ShapeMismatch(format!(
                    "{} inputs do not match the target signature",
                    role
                )));
            }
        }
        tracing::debug!(seeds = seeds.len(), "built contrastive batch");
        Ok(ContrastiveBatch {
            ids,
            target,
            context,
            negative,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopsage_core::{FeatureConfig, InMemoryGraph, MultiHopConfig, NegativeConfig, RelationOptions};

    fn ring(n: i64) -> InMemoryGraph {
        let mut g = InMemoryGraph::new(5);
        for v in 0..n {
            g.add_vertex(v, 0);
            g.add_undirected_edge(v, (v + 1) % n, 0, 1.0);
            g.set_dense_feature("feature", v, vec![v as f32; 4]);
            g.set_dense_feature("label", v, vec![(v % 3) as f32]);
        }
        g
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new(MultiHopConfig::new(vec![vec![0], vec![0]], vec![2, 3]))
            .with_features(FeatureConfig::dense(&["feature"], 4))
    }

    #[test]
    fn test_bipartite_pipeline() {
        let pipeline = SamplingPipeline::new(&config()).unwrap();
        let out = pipeline.run_ids(&mut ring(10), &[2, 4]).unwrap();
        let layers = out.as_bipartite().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].src_dense.as_ref().unwrap().shape(), &[2, 2, 4]);
        assert_eq!(layers[1].src[[1, 0]], 4);
        assert_eq!(layers[1].src_dense.as_ref().unwrap()[[1, 0, 0]], 4.0);
        assert_eq!(
            out.fields()[..4].to_vec(),
            vec!["layer0.src", "layer0.dst", "layer0.src_dense", "layer0.dst_dense"]
        );
    }

    #[test]
    fn test_relation_pipeline() {
        let config = config().with_encoding(Encoding::Relation(RelationOptions::sorted()));
        let pipeline = SamplingPipeline::new(&config).unwrap();
        let out = pipeline.run_ids(&mut ring(10), &[2, 4]).unwrap();
        let batch = out.as_relation().unwrap();
        let u = batch.graph.num_vertices();
        assert_eq!(batch.dense.as_ref().unwrap().shape(), &[u, 4]);
        assert_eq!(batch.graph.num_edges(), 16);
        assert_eq!(batch.graph.target_ids().iter().copied().collect::<Vec<_>>(), vec![2, 4]);
        // features are stored per unique ID
        for (row, &id) in batch.graph.unique_ids.iter().enumerate() {
            assert_eq!(batch.dense.as_ref().unwrap()[[row, 0]], id as f32);
        }
    }

    #[test]
    fn test_supervised_labels() {
        let pipeline = SupervisedPipeline::new(&config().with_label("label", 1)).unwrap();
        let out = pipeline.run(&mut ring(10), &[2, 4, 5]).unwrap();
        assert_eq!(out.labels.column(0).to_vec(), vec![2.0, 1.0, 2.0]);
        assert!(SupervisedPipeline::new(&config()).unwrap_err().is_config());
    }

    #[test]
    fn test_unsupervised_negative_symmetry() {
        let config = config().with_negative(NegativeConfig::new(vec![0], 5));
        let pipeline = UnsupervisedPipeline::new(&config).unwrap();
        let out = pipeline.run(&mut ring(10), &[1, 2, 3]).unwrap();

        assert_eq!(out.ids.target.shape(), &[3, 1]);
        assert_eq!(out.ids.context.shape(), &[3, 1]);
        assert_eq!(out.ids.negative.shape(), &[3, 5]);

        let target = out.target.as_bipartite().unwrap();
        let negative = out.negative.as_bipartite().unwrap();
        assert_eq!(target[0].dst.shape(), &[3, 1, 6]);
        assert_eq!(negative[0].dst.shape(), &[3, 5, 6]);
        assert_eq!(out.target.signature(), out.negative.signature());
        assert_eq!(out.target.signature(), out.context.signature());
    }

    #[test]
    fn test_unsupervised_relation_symmetry() {
        let config = config()
            .with_negative(NegativeConfig::new(vec![0], 5))
            .with_encoding(Encoding::Relation(RelationOptions::default()));
        let pipeline = UnsupervisedPipeline::new(&config).unwrap();
        let out = pipeline.run(&mut ring(10), &[1, 2, 3]).unwrap();
        let negative = out.negative.as_relation().unwrap();
        assert_eq!(negative.graph.target_indices.shape(), &[3, 5]);
        assert_eq!(negative.graph.num_edges(), 15 * 8);
    }

    #[test]
    fn test_signature_tracks_seed_rank() {
        let config = config().with_encoding(Encoding::Relation(RelationOptions::default()));
        let pipeline = SamplingPipeline::new(&config).unwrap();
        let flat = ArrayD::from_shape_vec(IxDyn(&[2]), vec![2, 4]).unwrap();
        let grouped = ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![2, 4]).unwrap();
        let wide = ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![2, 4]).unwrap();

        let flat = pipeline.run(&mut ring(10), &flat).unwrap().signature();
        let grouped = pipeline.run(&mut ring(10), &grouped).unwrap().signature();
        let wide = pipeline.run(&mut ring(10), &wide).unwrap().signature();
        assert_eq!(flat.seed_rank, 1);
        assert_eq!(grouped.seed_rank, 2);
        assert_ne!(flat, grouped);
        assert_eq!(grouped, wide);

        let bipartite = SamplingPipeline::new(&self::config()).unwrap();
        let seeds = ArrayD::from_shape_vec(IxDyn(&[2, 1]), vec![2, 4]).unwrap();
        let sig = bipartite.run(&mut ring(10), &seeds).unwrap().signature();
        assert_eq!(sig.seed_rank, 2);
    }
}
