//! Neighbor aggregation over structured batches.
//!
//! The same reductions work on both encodings:
//!
//! - bipartite: `dst_dense` regrouped to `[..., len(src), fanout, D]` and
//!   reduced over the fanout axis (no gather, duplicates kept)
//! - relation: child rows gathered along `relation_indices[1]` and
//!   segment-reduced into `relation_indices[0]`
//!
//! When every parent vertex appears once in the sample the two agree.

use hopsage_core::ndarray::{Array2, ArrayD, ArrayView2, Axis};
use hopsage_core::tensor::{segment_reduce, Reduce};
use hopsage_core::{Error, Result};
use hopsage_sample::BipartiteLayer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aggregation function for sampled neighborhoods.
///
/// Parsing from a string fails on unknown names, so a misspelled aggregator
/// in a configuration file is rejected before any sampling happens.
///
/// ```rust
/// use hopsage_nn::Aggregator;
///
/// assert_eq!("gcn".parse::<Aggregator>().unwrap(), Aggregator::Gcn);
/// assert!("lstm".parse::<Aggregator>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregator {
    /// Average of neighbor features
    #[default]
    Mean,
    /// Sum of neighbor features
    Sum,
    /// Element-wise maximum
    Max,
    /// `(self + sum(neighbors)) / (degree + 1)`
    Gcn,
}

impl FromStr for Aggregator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "max" | "max_pool" | "maxpool" => Ok(Self::Max),
            "gcn" => Ok(Self::Gcn),
            other => Err(Error::InvalidConfig(format!(
                "unknown aggregator '{}', expected one of mean, sum, max, gcn",
                other
            ))),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Max => "max",
            Self::Gcn => "gcn",
        };
        f.write_str(name)
    }
}

fn to_index(values: impl Iterator<Item = i64>, bound: usize) -> Result<Vec<usize>> {
    values
        .map(|v| match usize::try_from(v) {
            Ok(i) if i < bound => Ok(i),
            _ => Err(Error::ShapeMismatch(format!("relation index {} out of range for {} vertices", v, bound))),
        })
        .collect()
}

impl Aggregator {
    /// Aggregate child features into every parent of a relation graph.
    ///
    /// `features` is `[U, D]` over the unique vertices; the result is
    /// `[U, D]`. Vertices without children read as zero, except for `Gcn`
    /// which keeps their own features.
    pub fn aggregate_relation(
        self,
        features: ArrayView2<'_, f32>,
        relation_indices: &Array2<i64>,
        relation_weight: Option<&Array2<f32>>,
    ) -> Result<Array2<f32>> {
        let num_vertices = features.nrows();
        if relation_indices.nrows() != 2 {
            return Err(Error::ShapeMismatch(format!(
                "relation indices must be [2, E], got {:?}",
                relation_indices.shape()
            )));
        }
        let parents = to_index(relation_indices.row(0).iter().copied(), num_vertices)?;
        let children = to_index(relation_indices.row(1).iter().copied(), num_vertices)?;

        let mut messages = features.select(Axis(0), &children);
        if let Some(w) = relation_weight {
            if w.dim() != (children.len(), 1) {
                return Err(Error::ShapeMismatch(format!(
                    "relation weight has shape {:?} for {} edges",
                    w.shape(),
                    children.len()
                )));
            }
            messages *= w;
        }

        match self {
            Self::Mean => segment_reduce(messages.view(), &parents, num_vertices, Reduce::Mean),
            Self::Sum => segment_reduce(messages.view(), &parents, num_vertices, Reduce::Sum),
            Self::Max => segment_reduce(messages.view(), &parents, num_vertices, Reduce::Max),
            Self::Gcn => {
                let sum = segment_reduce(messages.view(), &parents, num_vertices, Reduce::Sum)?;
                let mut degree = vec![0usize; num_vertices];
                for &p in &parents {
                    degree[p] += 1;
                }
                let mut out = sum + &features;
                for (mut row, d) in out.outer_iter_mut().zip(degree) {
                    row /= (d + 1) as f32;
                }
                Ok(out)
            }
        }
    }

    /// Aggregate `dst_dense` of a bipartite layer into its `src` positions.
    ///
    /// Returns `[..., len(src), D]`.
    pub fn aggregate_bipartite(self, layer: &BipartiteLayer) -> Result<ArrayD<f32>> {
        let mut grouped = layer
            .dst_grouped_dense()?
            .ok_or_else(|| Error::Feature(format!("hop {} layer carries no dense features", layer.hop)))?;
        if let Some(w) = layer.edge_weight_grouped()? {
            let w = w.insert_axis(Axis(grouped.ndim() - 1));
            grouped = &grouped * &w;
        }
        let fanout_axis = Axis(grouped.ndim() - 2);

        match self {
            Self::Mean => grouped
                .mean_axis(fanout_axis)
                .ok_or_else(|| Error::ShapeMismatch("empty fanout axis".into())),
            Self::Sum => Ok(grouped.sum_axis(fanout_axis)),
            Self::Max => Ok(grouped.fold_axis(fanout_axis, f32::NEG_INFINITY, |acc, &v| acc.max(v))),
            Self::Gcn => {
                let src = layer
                    .src_dense
                    .as_ref()
                    .ok_or_else(|| Error::Feature("gcn aggregation needs src features".into()))?;
                let sum = grouped.sum_axis(fanout_axis);
                if sum.shape() != src.shape() {
                    return Err(Error::ShapeMismatch(format!(
                        "aggregated shape {:?} does not match src {:?}",
                        sum.shape(),
                        src.shape()
                    )));
                }
                Ok((sum + src) / (layer.fanout + 1) as f32)
            }
        }
    }
}
