//! Sampling pipeline configuration.
//!
//! Every struct deserializes from JSON and validates eagerly: configuration
//! problems surface as [`Error::InvalidConfig`] before the first RPC.
//!
//! ```rust
//! use hopsage_core::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json_str(r#"{
//!     "multi_hop": { "metapath": [[0], [0, 1]], "fanouts": [2, 3] },
//!     "features": { "dense_feature_names": ["feature"], "dense_feature_dims": 8 },
//!     "encoding": { "relation": { "sort_indices": true } }
//! }"#).unwrap();
//! assert_eq!(config.multi_hop.fanouts, vec![2, 3]);
//! ```

use crate::error::{Error, Result};
use crate::graph::{walk_pair_count, EdgeType, VertexType, WalkParams};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Metapath and fanouts of a multi-hop expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiHopConfig {
    /// Edge-type set sampled at each hop.
    pub metapath: Vec<Vec<EdgeType>>,
    /// Neighbors sampled per parent at each hop.
    pub fanouts: Vec<usize>,
    /// Also return edge weights.
    #[serde(default)]
    pub edge_weight: bool,
}

impl MultiHopConfig {
    pub fn new(metapath: Vec<Vec<EdgeType>>, fanouts: Vec<usize>) -> Self {
        Self {
            metapath,
            fanouts,
            edge_weight: false,
        }
    }

    pub fn with_edge_weight(mut self, edge_weight: bool) -> Self {
        self.edge_weight = edge_weight;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.metapath.is_empty() {
            return Err(Error::InvalidConfig("metapath must be specified".into()));
        }
        if self.fanouts.is_empty() {
            return Err(Error::InvalidConfig("fanouts must be specified".into()));
        }
        if self.metapath.len() != self.fanouts.len() {
            return Err(Error::InvalidConfig(format!(
                "metapath has {} hops but fanouts has {}",
                self.metapath.len(),
                self.fanouts.len()
            )));
        }
        if let Some(hop) = self.metapath.iter().position(Vec::is_empty) {
            return Err(Error::InvalidConfig(format!(
                "metapath hop {} has no edge types",
                hop + 1
            )));
        }
        if let Some(hop) = self.fanouts.iter().position(|&f| f == 0) {
            return Err(Error::InvalidConfig(format!(
                "fanout at hop {} must be positive, got 0",
                hop + 1
            )));
        }
        Ok(())
    }
}

/// Feature dimensions: one value for every name, or one per name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimSpec {
    All(usize),
    PerName(Vec<usize>),
}

impl DimSpec {
    /// Expand to one dimension per name.
    pub fn expand(&self, names: &[String]) -> Result<Vec<usize>> {
        let dims = match self {
            DimSpec::All(d) => vec![*d; names.len()],
            DimSpec::PerName(ds) => ds.clone(),
        };
        if dims.len() != names.len() {
            return Err(Error::InvalidConfig(format!(
                "{} feature names but {} dims",
                names.len(),
                dims.len()
            )));
        }
        if dims.contains(&0) {
            return Err(Error::InvalidConfig("feature dims must be positive".into()));
        }
        Ok(dims)
    }
}

/// Dense and sparse vertex features to attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub dense_feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub dense_feature_dims: Option<DimSpec>,
    #[serde(default)]
    pub sparse_feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub sparse_feature_dims: Option<DimSpec>,
}

impl FeatureConfig {
    pub fn dense(names: &[&str], dim: usize) -> Self {
        Self {
            dense_feature_names: Some(names.iter().map(|s| s.to_string()).collect()),
            dense_feature_dims: Some(DimSpec::All(dim)),
            ..Default::default()
        }
    }

    pub fn with_sparse(mut self, names: &[&str]) -> Self {
        self.sparse_feature_names = Some(names.iter().map(|s| s.to_string()).collect());
        self.sparse_feature_dims = Some(DimSpec::All(1));
        self
    }

    /// Resolved `(names, dims)` for dense features.
    ///
    /// Names without dims are a configuration error.
    pub fn resolve_dense(&self) -> Result<Option<(Vec<String>, Vec<usize>)>> {
        let Some(names) = &self.dense_feature_names else {
            return Ok(None);
        };
        let dims = self
            .dense_feature_dims
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("dense_feature_dims must be set (int or list)".into()))?
            .expand(names)?;
        Ok(Some((names.clone(), dims)))
    }

    /// Resolved `(names, dims)` for sparse features; dims default to 1 and
    /// only one-dimensional sparse features are supported.
    pub fn resolve_sparse(&self) -> Result<Option<(Vec<String>, Vec<usize>)>> {
        let Some(names) = &self.sparse_feature_names else {
            return Ok(None);
        };
        let dims = self
            .sparse_feature_dims
            .clone()
            .unwrap_or(DimSpec::All(1))
            .expand(names)?;
        if dims.iter().any(|&d| d != 1) {
            return Err(Error::InvalidConfig("only one-dim sparse features are supported".into()));
        }
        Ok(Some((names.clone(), dims)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.dense_feature_names.is_none() && self.sparse_feature_names.is_none() {
            return Err(Error::InvalidConfig(
                "one of dense or sparse feature names must be specified".into(),
            ));
        }
        self.resolve_dense()?;
        self.resolve_sparse()?;
        Ok(())
    }
}

/// Ordering of relation edges. Output-ordering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationOptions {
    /// Sort edges by parent index.
    #[serde(default)]
    pub sort_indices: bool,
    /// Keep ties in original edge order when sorting.
    #[serde(default = "default_true")]
    pub sort_stable: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RelationOptions {
    fn default() -> Self {
        Self {
            sort_indices: false,
            sort_stable: true,
        }
    }
}

impl RelationOptions {
    pub fn sorted() -> Self {
        Self {
            sort_indices: true,
            sort_stable: true,
        }
    }
}

/// Which computation-graph encoding a pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Per-hop src/dst tensors with duplicates.
    #[default]
    Bipartite,
    /// Deduplicated edge list plus inverse indices.
    Relation(RelationOptions),
}

/// Negative sampling for unsupervised objectives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeConfig {
    /// Vertex types negatives are drawn from.
    pub vertex_type: Vec<VertexType>,
    /// Negatives per seed.
    pub negative_num: usize,
}

impl NegativeConfig {
    pub fn new(vertex_type: Vec<VertexType>, negative_num: usize) -> Self {
        Self {
            vertex_type,
            negative_num,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vertex_type.is_empty() {
            return Err(Error::InvalidConfig("negative vertex_type must be specified".into()));
        }
        if self.negative_num == 0 {
            return Err(Error::InvalidConfig("negative_num must be positive".into()));
        }
        Ok(())
    }
}

/// Random-walk contexts for skip-gram objectives (DeepWalk, node2vec).
///
/// Steps follow `metapath` when it is set; otherwise every one of the
/// `walk_length` steps uses `edge_types`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomWalkConfig {
    #[serde(default)]
    pub edge_types: Vec<EdgeType>,
    #[serde(default)]
    pub walk_length: Option<usize>,
    #[serde(default)]
    pub metapath: Option<Vec<Vec<EdgeType>>>,
    /// Largest step distance between a target and its context.
    pub context_size: usize,
    /// Walks per start vertex.
    #[serde(default = "default_repetition")]
    pub repetition: usize,
    #[serde(default = "default_walk_bias")]
    pub walk_p: f32,
    #[serde(default = "default_walk_bias")]
    pub walk_q: f32,
}

fn default_repetition() -> usize {
    1
}

fn default_walk_bias() -> f32 {
    1.0
}

impl RandomWalkConfig {
    /// `walk_length` steps over `edge_types`.
    pub fn new(edge_types: Vec<EdgeType>, walk_length: usize, context_size: usize) -> Self {
        Self {
            edge_types,
            walk_length: Some(walk_length),
            metapath: None,
            context_size,
            repetition: default_repetition(),
            walk_p: default_walk_bias(),
            walk_q: default_walk_bias(),
        }
    }

    /// One step per metapath entry.
    pub fn from_metapath(metapath: Vec<Vec<EdgeType>>, context_size: usize) -> Self {
        Self {
            edge_types: Vec::new(),
            walk_length: None,
            metapath: Some(metapath),
            context_size,
            repetition: default_repetition(),
            walk_p: default_walk_bias(),
            walk_q: default_walk_bias(),
        }
    }

    pub fn with_repetition(mut self, repetition: usize) -> Self {
        self.repetition = repetition;
        self
    }

    pub fn with_bias(mut self, walk_p: f32, walk_q: f32) -> Self {
        self.walk_p = walk_p;
        self.walk_q = walk_q;
        self
    }

    /// Edge types of every step.
    pub fn metapath(&self) -> Result<Vec<Vec<EdgeType>>> {
        let metapath = match (&self.metapath, self.walk_length) {
            (Some(metapath), _) => metapath.clone(),
            (None, Some(length)) => {
                if self.edge_types.is_empty() {
                    return Err(Error::InvalidConfig("walk edge_types must be specified".into()));
                }
                vec![self.edge_types.clone(); length]
            }
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "one of walk_length and metapath must be specified".into(),
                ))
            }
        };
        if metapath.is_empty() {
            return Err(Error::InvalidConfig("walks need at least one step".into()));
        }
        if let Some(step) = metapath.iter().position(Vec::is_empty) {
            return Err(Error::InvalidConfig(format!("walk step {} has no edge types", step + 1)));
        }
        Ok(metapath)
    }

    pub fn params(&self) -> WalkParams {
        WalkParams {
            repetition: self.repetition,
            context_size: self.context_size,
            p: self.walk_p,
            q: self.walk_q,
        }
    }

    /// Pairs produced for every start vertex.
    pub fn pairs_per_vertex(&self) -> Result<usize> {
        let walk_length = self.metapath()?.len();
        Ok(self.repetition * walk_pair_count(walk_length, self.context_size))
    }

    pub fn validate(&self) -> Result<()> {
        let walk_length = self.metapath()?.len();
        self.params().validate()?;
        if self.context_size > walk_length {
            return Err(Error::InvalidConfig(format!(
                "context_size {} exceeds walk length {}",
                self.context_size, walk_length
            )));
        }
        Ok(())
    }
}

/// Label lookup for supervised objectives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelConfig {
    pub label_name: String,
    pub label_dim: usize,
}

impl LabelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.label_name.is_empty() || self.label_dim == 0 {
            return Err(Error::InvalidConfig("label_name and a positive label_dim are required".into()));
        }
        Ok(())
    }
}

/// Full pipeline configuration as read from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub multi_hop: MultiHopConfig,
    #[serde(default)]
    pub features: Option<FeatureConfig>,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub label: Option<LabelConfig>,
    #[serde(default)]
    pub negative: Option<NegativeConfig>,
    /// Seeds per batch when a loader splits a seed list.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    512
}

impl PipelineConfig {
    pub fn new(multi_hop: MultiHopConfig) -> Self {
        Self {
            multi_hop,
            features: None,
            encoding: Encoding::default(),
            label: None,
            negative: None,
            batch_size: default_batch_size(),
        }
    }

    pub fn with_features(mut self, features: FeatureConfig) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_label(mut self, label_name: impl Into<String>, label_dim: usize) -> Self {
        self.label = Some(LabelConfig {
            label_name: label_name.into(),
            label_dim,
        });
        self
    }

    pub fn with_negative(mut self, negative: NegativeConfig) -> Self {
        self.negative = Some(negative);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.multi_hop.validate()?;
        if let Some(features) = &self.features {
            features.validate()?;
        }
        if let Some(label) = &self.label {
            label.validate()?;
        }
        if let Some(negative) = &self.negative {
            negative.validate()?;
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".into()));
        }
        Ok(())
    }

    /// Parse and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_hop_validation() {
        assert!(MultiHopConfig::new(vec![vec![0], vec![0]], vec![2, 3]).validate().is_ok());
        assert!(MultiHopConfig::new(vec![vec![0]], vec![2, 3]).validate().unwrap_err().is_config());
        assert!(MultiHopConfig::new(vec![], vec![]).validate().is_err());
        assert!(MultiHopConfig::new(vec![vec![0], vec![]], vec![2, 3]).validate().is_err());
        assert!(MultiHopConfig::new(vec![vec![0]], vec![0]).validate().is_err());
    }

    #[test]
    fn test_feature_dims_resolution() {
        let cfg = FeatureConfig {
            dense_feature_names: Some(vec!["a".into(), "b".into()]),
            dense_feature_dims: Some(DimSpec::All(4)),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_dense().unwrap().unwrap().1, vec![4, 4]);

        let missing_dims = FeatureConfig {
            dense_feature_names: Some(vec!["a".into()]),
            ..Default::default()
        };
        assert!(missing_dims.validate().unwrap_err().is_config());

        let wrong_len = FeatureConfig {
            dense_feature_names: Some(vec!["a".into()]),
            dense_feature_dims: Some(DimSpec::PerName(vec![1, 2])),
            ..Default::default()
        };
        assert!(wrong_len.validate().is_err());

        assert!(FeatureConfig::default().validate().is_err());

        let sparse = FeatureConfig::default().with_sparse(&["cat"]);
        assert_eq!(sparse.resolve_sparse().unwrap().unwrap().1, vec![1]);
        let wide_sparse = FeatureConfig {
            sparse_feature_names: Some(vec!["cat".into()]),
            sparse_feature_dims: Some(DimSpec::All(2)),
            ..Default::default()
        };
        assert!(wide_sparse.validate().is_err());
    }

    #[test]
    fn test_pipeline_from_json() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "multi_hop": { "metapath": [[0], [0]], "fanouts": [2, 3], "edge_weight": true },
                "features": { "dense_feature_names": ["f1", "f2"], "dense_feature_dims": [3, 5] },
                "encoding": "bipartite",
                "negative": { "vertex_type": [0], "negative_num": 5 },
                "batch_size": 64
            }"#,
        )
        .unwrap();
        assert!(config.multi_hop.edge_weight);
        assert_eq!(config.encoding, Encoding::Bipartite);
        assert_eq!(config.negative.unwrap().negative_num, 5);
        assert_eq!(config.batch_size, 64);

        let relation = PipelineConfig::from_json_str(
            r#"{
                "multi_hop": { "metapath": [[0]], "fanouts": [4] },
                "encoding": { "relation": { "sort_indices": true } }
            }"#,
        )
        .unwrap();
        assert_eq!(relation.encoding, Encoding::Relation(RelationOptions::sorted()));
        assert_eq!(relation.batch_size, 512);
    }

    #[test]
    fn test_pipeline_rejects_bad_config() {
        let err = PipelineConfig::from_json_str(
            r#"{ "multi_hop": { "metapath": [[0]], "fanouts": [2, 3] } }"#,
        )
        .unwrap_err();
        assert!(err.is_config());

        let err = PipelineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));

        let err = PipelineConfig::new(MultiHopConfig::new(vec![vec![0]], vec![1]))
            .with_negative(NegativeConfig::new(vec![0], 0))
            .validate()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_random_walk_config() {
        let cfg: RandomWalkConfig = serde_json::from_str(
            r#"{ "edge_types": [0, 1], "walk_length": 3, "context_size": 2, "walk_q": 0.5 }"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.metapath().unwrap(), vec![vec![0, 1]; 3]);
        assert_eq!(cfg.repetition, 1);
        assert_eq!(cfg.params().q, 0.5);
        assert_eq!(cfg.pairs_per_vertex().unwrap(), 10);

        let by_path = RandomWalkConfig::from_metapath(vec![vec![0], vec![1]], 1).with_repetition(3);
        assert_eq!(by_path.pairs_per_vertex().unwrap(), 3 * 4);

        let neither = RandomWalkConfig {
            walk_length: None,
            ..RandomWalkConfig::new(vec![0], 3, 1)
        };
        assert!(neither.validate().unwrap_err().is_config());
        assert!(RandomWalkConfig::new(vec![0], 2, 3).validate().is_err());
        assert!(RandomWalkConfig::new(vec![], 2, 1).validate().is_err());
        assert!(RandomWalkConfig::new(vec![0], 2, 1).with_bias(0.0, 1.0).validate().is_err());
    }
}
