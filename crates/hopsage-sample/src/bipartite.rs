//! Bipartite layer stack.
//!
//! Dense aggregation layers work hop by hop without deduplication: the
//! flattened multi-hop row is cut at the fanout widths and each adjacent
//! pair of segments becomes one layer.
//!
//! ```text
//! fanouts [2, 3], row = [s | a b | a1 a2 a3 b1 b2 b3]
//!
//! layer 0 (hop 2): src = [a b]   dst = [a1 a2 a3 b1 b2 b3]
//! layer 1 (hop 1): src = [s]     dst = [a b]
//! ```
//!
//! Layers are ordered deepest hop first, the direction aggregation runs.
//! `src -> dst` is the sampling direction, `dst -> src` the aggregation
//! direction. Duplicated vertices are kept: each copy carries its own
//! position in the tree.

use crate::feature::HopFeatures;
use hopsage_core::graph::VertexId;
use hopsage_core::ndarray::ArrayD;
use hopsage_core::tensor::{reshape, split_axis};
use hopsage_core::{Error, FanoutProfile, Result};

/// One hop of the bipartite stack.
#[derive(Debug, Clone, PartialEq)]
pub struct BipartiteLayer {
    /// Hop number of `dst` (1-based).
    pub hop: usize,
    /// Children per `src` element.
    pub fanout: usize,
    /// `[..., widths[hop - 1]]`
    pub src: ArrayD<VertexId>,
    /// `[..., widths[hop]]`
    pub dst: ArrayD<VertexId>,
    pub src_dense: Option<ArrayD<f32>>,
    pub dst_dense: Option<ArrayD<f32>>,
    pub src_sparse: Option<ArrayD<i64>>,
    pub dst_sparse: Option<ArrayD<i64>>,
    /// Weight of the edge into each `dst` element, `[..., widths[hop]]`.
    pub edge_weight: Option<ArrayD<f32>>,
}

impl BipartiteLayer {
    fn lead_shape(&self) -> &[usize] {
        let shape = self.src.shape();
        &shape[..shape.len() - 1]
    }

    fn grouped_shape(&self) -> Vec<usize> {
        let mut shape = self.lead_shape().to_vec();
        shape.push(self.src.shape()[self.src.ndim() - 1]);
        shape.push(self.fanout);
        shape
    }

    /// `dst` as `[..., len(src), fanout]`. Row `j` holds the children of
    /// `src[j]`; no gather is needed.
    pub fn dst_grouped_ids(&self) -> Result<ArrayD<VertexId>> {
        reshape(self.dst.clone(), &self.grouped_shape())
    }

    /// `dst_dense` as `[..., len(src), fanout, dim]`.
    pub fn dst_grouped_dense(&self) -> Result<Option<ArrayD<f32>>> {
        let Some(dense) = &self.dst_dense else {
            return Ok(None);
        };
        let mut shape = self.grouped_shape();
        shape.push(dense.shape()[dense.ndim() - 1]);
        reshape(dense.clone(), &shape).map(Some)
    }

    /// `edge_weight` as `[..., len(src), fanout]`.
    pub fn edge_weight_grouped(&self) -> Result<Option<ArrayD<f32>>> {
        self.edge_weight
            .as_ref()
            .map(|w| reshape(w.clone(), &self.grouped_shape()))
            .transpose()
    }

    /// Names of the tensors present in this layer.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = vec!["src", "dst"];
        if self.src_dense.is_some() {
            fields.extend(["src_dense", "dst_dense"]);
        }
        if self.src_sparse.is_some() {
            fields.extend(["src_sparse", "dst_sparse"]);
        }
        if self.edge_weight.is_some() {
            fields.push("edge_weight");
        }
        fields
    }
}

fn check_lead(name: &str, ids: &ArrayD<VertexId>, shape: &[usize], extra: usize) -> Result<()> {
    if shape.len() != ids.ndim() + extra || &shape[..ids.ndim()] != ids.shape() {
        return Err(Error::ShapeMismatch(format!(
            "{} has shape {:?}, ids have shape {:?}",
            name,
            shape,
            ids.shape()
        )));
    }
    Ok(())
}

fn split_pair<T: Clone>(parts: Option<&[ArrayD<T>]>, hop: usize) -> (Option<ArrayD<T>>, Option<ArrayD<T>>) {
    match parts {
        Some(parts) => (Some(parts[hop - 1].clone()), Some(parts[hop].clone())),
        None => (None, None),
    }
}

/// Split a multi-hop row into per-hop bipartite layers, deepest hop first.
pub fn to_bipartite(profile: &FanoutProfile, input: &HopFeatures) -> Result<Vec<BipartiteLayer>> {
    let ids = &input.ids;
    if ids.ndim() == 0 || ids.shape()[ids.ndim() - 1] != profile.total_width() {
        return Err(Error::ShapeMismatch(format!(
            "ids have shape {:?}, expected trailing width {}",
            ids.shape(),
            profile.total_width()
        )));
    }
    let axis = ids.ndim() - 1;
    let widths = profile.widths();

    if let Some(dense) = &input.dense {
        check_lead("dense", ids, dense.shape(), 1)?;
    }
    if let Some(sparse) = &input.sparse {
        check_lead("sparse", ids, sparse.shape(), 1)?;
    }
    if let Some(weight) = &input.edge_weight {
        check_lead("edge_weight", ids, weight.shape(), 0)?;
    }

    let id_parts = split_axis(ids, axis, widths)?;
    let dense_parts = input
        .dense
        .as_ref()
        .map(|d| split_axis(d, axis, widths))
        .transpose()?;
    let sparse_parts = input
        .sparse
        .as_ref()
        .map(|s| split_axis(s, axis, widths))
        .transpose()?;
    let weight_parts = input
        .edge_weight
        .as_ref()
        .map(|w| split_axis(w, axis, widths))
        .transpose()?;

    let mut layers = Vec::with_capacity(profile.num_hops());
    for hop in (1..=profile.num_hops()).rev() {
        let (src_dense, dst_dense) = split_pair(dense_parts.as_deref(), hop);
        let (src_sparse, dst_sparse) = split_pair(sparse_parts.as_deref(), hop);
        layers.push(BipartiteLayer {
            hop,
            fanout: profile.fanout_at(hop),
            src: id_parts[hop - 1].clone(),
            dst: id_parts[hop].clone(),
            src_dense,
            dst_dense,
            src_sparse,
            dst_sparse,
            edge_weight: weight_parts.as_ref().map(|w| w[hop].clone()),
        });
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopsage_core::ndarray::{Array, IxDyn};

    fn hop_ids(rows: usize, width: usize) -> ArrayD<VertexId> {
        Array::from_shape_vec(IxDyn(&[rows, width]), (0..(rows * width) as i64).collect()).unwrap()
    }

    #[test]
    fn test_two_hop_layers() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let input = HopFeatures {
            ids: hop_ids(4, 9),
            dense: Some(ArrayD::zeros(IxDyn(&[4, 9, 16]))),
            sparse: None,
            edge_weight: Some(ArrayD::ones(IxDyn(&[4, 9]))),
        };
        let layers = to_bipartite(&profile, &input).unwrap();
        assert_eq!(layers.len(), 2);

        assert_eq!(layers[0].hop, 2);
        assert_eq!(layers[0].src.shape(), &[4, 2]);
        assert_eq!(layers[0].dst.shape(), &[4, 6]);
        assert_eq!(layers[0].src_dense.as_ref().unwrap().shape(), &[4, 2, 16]);
        assert_eq!(layers[0].dst_dense.as_ref().unwrap().shape(), &[4, 6, 16]);
        assert_eq!(layers[0].edge_weight.as_ref().unwrap().shape(), &[4, 6]);

        assert_eq!(layers[1].hop, 1);
        assert_eq!(layers[1].src.shape(), &[4, 1]);
        assert_eq!(layers[1].dst.shape(), &[4, 2]);
        assert_eq!(layers[1].src_dense.as_ref().unwrap().shape(), &[4, 1, 16]);
        assert_eq!(layers[1].edge_weight.as_ref().unwrap().shape(), &[4, 2]);
        assert_eq!(
            layers[1].fields(),
            vec!["src", "dst", "src_dense", "dst_dense", "edge_weight"]
        );
    }

    #[test]
    fn test_dst_grouping_matches_template() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let input = HopFeatures::from_ids(hop_ids(1, 9));
        let layers = to_bipartite(&profile, &input).unwrap();
        let grouped = layers[0].dst_grouped_ids().unwrap();
        assert_eq!(grouped.shape(), &[1, 2, 3]);
        // children of position 2 are positions 6..9
        assert_eq!(grouped[[0, 1, 0]], 6);
        assert_eq!(grouped[[0, 1, 2]], 8);
        for &(parent, child) in profile.edge_template() {
            if parent >= 1 {
                let j = parent - 1;
                let k = (child - 3) % 3;
                assert_eq!(grouped[[0, j, k]], child as i64);
            }
        }
        assert!(layers[0].dst_grouped_dense().unwrap().is_none());
    }

    #[test]
    fn test_single_hop_and_grouped_batches() {
        let profile = FanoutProfile::new(&[4]).unwrap();
        let ids = Array::from_shape_vec(IxDyn(&[3, 2, 5]), (0..30i64).collect()).unwrap();
        let layers = to_bipartite(&profile, &HopFeatures::from_ids(ids)).unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].src.shape(), &[3, 2, 1]);
        assert_eq!(layers[0].dst.shape(), &[3, 2, 4]);
        assert_eq!(layers[0].dst_grouped_ids().unwrap().shape(), &[3, 2, 1, 4]);
    }

    #[test]
    fn test_shape_errors() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let err = to_bipartite(&profile, &HopFeatures::from_ids(hop_ids(2, 8))).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));

        let input = HopFeatures {
            ids: hop_ids(2, 9),
            dense: Some(ArrayD::zeros(IxDyn(&[3, 9, 4]))),
            sparse: None,
            edge_weight: None,
        };
        assert!(to_bipartite(&profile, &input).is_err());
    }
}
