//! Vertex feature attachment.
//!
//! Features are looked up once per *unique* vertex ID of a sampled batch and
//! then either gathered back out to every tree position (dense form, for
//! bipartite layers) or kept per unique ID next to an index tensor (sparse
//! form, for relation graphs).

use crate::multi_hop::MultiHop;
use hopsage_core::graph::{FeatureStore, VertexId};
use hopsage_core::ndarray::{Array1, Array2, ArrayD, Axis, IxDyn};
use hopsage_core::tensor::{concat_columns, gather_rows, unique_inverse};
use hopsage_core::{Error, FeatureConfig, LabelConfig, Result};

/// Per-position tensors of one multi-hop sample.
///
/// `ids` is `[..., W]`; `dense` and `sparse` add a trailing feature axis,
/// `edge_weight` matches `ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct HopFeatures {
    pub ids: ArrayD<VertexId>,
    pub dense: Option<ArrayD<f32>>,
    pub sparse: Option<ArrayD<i64>>,
    pub edge_weight: Option<ArrayD<f32>>,
}

impl HopFeatures {
    /// IDs only, no features or weights.
    pub fn from_ids(ids: ArrayD<VertexId>) -> Self {
        Self {
            ids,
            dense: None,
            sparse: None,
            edge_weight: None,
        }
    }
}

impl From<MultiHop> for HopFeatures {
    fn from(sample: MultiHop) -> Self {
        Self {
            ids: sample.ids,
            dense: None,
            sparse: None,
            edge_weight: sample.edge_weight,
        }
    }
}

/// Deduplicated form of a multi-hop sample.
///
/// `ids[indices]` reproduces the original ID tensor; features are stored
/// once per row of `ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseHopFeatures {
    /// Sorted unique IDs, `[U]`.
    pub ids: Array1<VertexId>,
    /// Index of every position into `ids`, `[..., W]`.
    pub indices: ArrayD<i64>,
    /// `[U, D]`
    pub dense: Option<Array2<f32>>,
    /// `[U, S]`
    pub sparse: Option<Array2<i64>>,
    /// `[..., W]`, aligned with `indices`.
    pub edge_weight: Option<ArrayD<f32>>,
}

impl SparseHopFeatures {
    pub fn num_unique(&self) -> usize {
        self.ids.len()
    }

    /// Expand back to the per-position form.
    pub fn to_dense(&self) -> Result<HopFeatures> {
        let lead = self.indices.shape().to_vec();
        let index: Vec<usize> = self
            .indices
            .iter()
            .map(|&i| usize::try_from(i))
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::ShapeMismatch("negative feature index".into()))?;
        let ids = Array2::from_shape_vec((self.ids.len(), 1), self.ids.to_vec())?;
        let ids = gather_rows(&ids, &index, &lead)?.index_axis_move(Axis(lead.len()), 0);
        Ok(HopFeatures {
            ids,
            dense: self
                .dense
                .as_ref()
                .map(|d| gather_rows(d, &index, &lead))
                .transpose()?,
            sparse: self
                .sparse
                .as_ref()
                .map(|s| gather_rows(s, &index, &lead))
                .transpose()?,
            edge_weight: self.edge_weight.clone(),
        })
    }
}

/// Resolved feature names and dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSpec {
    dense: Option<(Vec<String>, Vec<usize>)>,
    sparse: Option<(Vec<String>, Vec<usize>)>,
}

impl FeatureSpec {
    pub fn new(config: &FeatureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dense: config.resolve_dense()?,
            sparse: config.resolve_sparse()?,
        })
    }

    /// Width of the concatenated dense block, 0 without dense features.
    pub fn dense_dim(&self) -> usize {
        self.dense.as_ref().map_or(0, |(_, dims)| dims.iter().sum())
    }

    pub fn sparse_dim(&self) -> usize {
        self.sparse.as_ref().map_or(0, |(_, dims)| dims.iter().sum())
    }

    /// Dense features of `ids`, all names concatenated: `[len(ids), dense_dim]`.
    pub fn fetch_dense<S: FeatureStore>(&self, store: &mut S, ids: &[VertexId]) -> Result<Option<Array2<f32>>> {
        let Some((names, dims)) = &self.dense else {
            return Ok(None);
        };
        let blocks = store.dense_features(ids, names, dims)?;
        check_blocks(&blocks, ids.len(), names, dims)?;
        concat_columns(&blocks).map(Some)
    }

    /// Sparse features of `ids`: `[len(ids), sparse_dim]`.
    pub fn fetch_sparse<S: FeatureStore>(&self, store: &mut S, ids: &[VertexId]) -> Result<Option<Array2<i64>>> {
        let Some((names, dims)) = &self.sparse else {
            return Ok(None);
        };
        let blocks = store.sparse_features(ids, names, dims)?;
        check_blocks(&blocks, ids.len(), names, dims)?;
        concat_columns(&blocks).map(Some)
    }

    /// Look up features for every unique ID of `sample` and gather them back
    /// to each position.
    pub fn attach<S: FeatureStore>(&self, store: &mut S, sample: MultiHop) -> Result<HopFeatures> {
        let lead = sample.ids.shape().to_vec();
        let flat: Vec<VertexId> = sample.ids.iter().copied().collect();
        let (unique, inverse) = unique_inverse(&flat);
        tracing::debug!(positions = flat.len(), unique = unique.len(), "fetching features");

        let dense = self
            .fetch_dense(store, &unique)?
            .map(|table| gather_rows(&table, &inverse, &lead))
            .transpose()?;
        let sparse = self
            .fetch_sparse(store, &unique)?
            .map(|table| gather_rows(&table, &inverse, &lead))
            .transpose()?;
        Ok(HopFeatures {
            ids: sample.ids,
            dense,
            sparse,
            edge_weight: sample.edge_weight,
        })
    }

    /// Deduplicate `sample` and look up features once per unique ID.
    pub fn attach_sparse<S: FeatureStore>(&self, store: &mut S, sample: MultiHop) -> Result<SparseHopFeatures> {
        let flat: Vec<VertexId> = sample.ids.iter().copied().collect();
        let (unique, inverse) = unique_inverse(&flat);
        let dense = self.fetch_dense(store, &unique)?;
        let sparse = self.fetch_sparse(store, &unique)?;
        let indices = ArrayD::from_shape_vec(
            IxDyn(sample.ids.shape()),
            inverse.into_iter().map(|i| i as i64).collect(),
        )?;
        Ok(SparseHopFeatures {
            ids: Array1::from(unique),
            indices,
            dense,
            sparse,
            edge_weight: sample.edge_weight,
        })
    }
}

fn check_blocks<T>(blocks: &[Array2<T>], rows: usize, names: &[String], dims: &[usize]) -> Result<()> {
    if blocks.len() != names.len() {
        tracing::warn!(expected = names.len(), got = blocks.len(), "feature response has wrong arity");
        return Err(Error::Feature(format!(
            "requested {:?}, store returned {} blocks",
            names,
            blocks.len()
        )));
    }
    for ((block, name), &dim) in blocks.iter().zip(names).zip(dims) {
        if block.dim() != (rows, dim) {
            return Err(Error::Feature(format!(
                "feature {} has shape {:?}, expected [{}, {}]",
                name,
                block.shape(),
                rows,
                dim
            )));
        }
    }
    Ok(())
}

/// Labels of `ids`, `[len(ids), label_dim]`.
pub fn fetch_labels<S: FeatureStore>(store: &mut S, label: &LabelConfig, ids: &[VertexId]) -> Result<Array2<f32>> {
    label.validate()?;
    let names = [label.label_name.clone()];
    let dims = [label.label_dim];
    let mut blocks = store.dense_features(ids, &names, &dims)?;
    check_blocks(&blocks, ids.len(), &names, &dims)?;
    blocks
        .pop()
        .ok_or_else(|| Error::Feature(format!("no labels for {}", label.label_name)))
}
