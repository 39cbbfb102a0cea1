//! Relation graph encoding.
//!
//! Sparse aggregation layers want every vertex once and an explicit edge
//! list. The multi-hop row is deduplicated, and the fanout edge template
//! (identical for every seed) is replayed per row over the inverse indices:
//!
//! ```text
//! ids     [[2, 3, 4, 2, 5, ...], ...]       [N, W]
//! unique  [2, 3, 4, 5, ...]                 [U]
//! edges   (inv[r*W + p], inv[r*W + c])      for r in rows, (p, c) in template
//! ```
//!
//! Edges are emitted seed-major, template-minor. That order lines up one to
//! one with the non-root columns of the edge-weight tensor, so weight `e`
//! always belongs to edge `e`, sorted or not.

use hopsage_core::graph::VertexId;
use hopsage_core::ndarray::{Array1, Array2, ArrayD, IxDyn};
use hopsage_core::tensor::{argsort, unique_inverse};
use hopsage_core::{Error, FanoutProfile, RelationOptions, Result};

/// Edge list and seed positions over an already deduplicated index space.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationIndices {
    /// `[2, E]`: row 0 parents, row 1 children.
    pub relation_indices: Array2<i64>,
    /// `[E, 1]`
    pub relation_weight: Option<Array2<f32>>,
    /// Index of every seed, shaped like the seed batch.
    pub target_indices: ArrayD<i64>,
}

/// Deduplicated relation graph of one multi-hop sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationGraph {
    /// `[U]`, sorted ascending.
    pub unique_ids: Array1<VertexId>,
    pub relation_indices: Array2<i64>,
    pub relation_weight: Option<Array2<f32>>,
    pub target_indices: ArrayD<i64>,
}

impl RelationGraph {
    pub fn num_vertices(&self) -> usize {
        self.unique_ids.len()
    }

    pub fn num_edges(&self) -> usize {
        self.relation_indices.ncols()
    }

    /// `(parent, child)` index pairs in stored order.
    pub fn edges(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.relation_indices
            .row(0)
            .into_iter()
            .copied()
            .zip(self.relation_indices.row(1).into_iter().copied())
    }

    /// Seed IDs recovered through `target_indices`.
    pub fn target_ids(&self) -> ArrayD<VertexId> {
        self.target_indices.mapv(|i| self.unique_ids[i as usize])
    }
}

fn seed_shape(profile: &FanoutProfile, shape: &[usize], rows: usize) -> Vec<usize> {
    match shape.split_last() {
        Some((&last, lead)) if last == profile.total_width() => lead.to_vec(),
        _ => vec![rows],
    }
}

/// Build the edge list over `indices`, positions already mapped into a
/// deduplicated vertex space.
///
/// `indices` may be any shape whose element count is a multiple of the total
/// width; when its last axis equals the total width, `target_indices` takes
/// the leading shape, otherwise it is flat.
pub fn relation_from_indices(
    profile: &FanoutProfile,
    indices: &ArrayD<i64>,
    edge_weight: Option<&ArrayD<f32>>,
    options: RelationOptions,
) -> Result<RelationIndices> {
    let width = profile.total_width();
    let rows = profile.rows_for(indices.len())?;
    let flat: Vec<i64> = indices.iter().copied().collect();

    let weights: Option<Vec<f32>> = match edge_weight {
        Some(w) if w.shape() != indices.shape() => {
            return Err(Error::ShapeMismatch(format!(
                "edge weights have shape {:?}, indices have shape {:?}",
                w.shape(),
                indices.shape()
            )));
        }
        Some(w) => Some(w.iter().copied().collect()),
        None => None,
    };

    let template = profile.edge_template();
    let num_edges = rows * template.len();
    let mut parents = Vec::with_capacity(num_edges);
    let mut children = Vec::with_capacity(num_edges);
    let mut edge_weights = weights.as_ref().map(|_| Vec::with_capacity(num_edges));
    for row in 0..rows {
        let base = row * width;
        for &(p, c) in template {
            parents.push(flat[base + p]);
            children.push(flat[base + c]);
            if let (Some(out), Some(w)) = (edge_weights.as_mut(), weights.as_ref()) {
                out.push(w[base + c]);
            }
        }
    }

    if options.sort_indices {
        let order = argsort(&parents, options.sort_stable);
        parents = order.iter().map(|&i| parents[i]).collect();
        children = order.iter().map(|&i| children[i]).collect();
        edge_weights = edge_weights.map(|w| order.iter().map(|&i| w[i]).collect());
    }

    let mut pairs = parents;
    pairs.extend(children);
    let relation_indices = Array2::from_shape_vec((2, num_edges), pairs)?;
    let relation_weight = edge_weights
        .map(|w| Array2::from_shape_vec((num_edges, 1), w))
        .transpose()?;

    let targets: Vec<i64> = (0..rows).map(|row| flat[row * width]).collect();
    let target_indices = ArrayD::from_shape_vec(IxDyn(&seed_shape(profile, indices.shape(), rows)), targets)?;

    tracing::debug!(rows, edges = num_edges, sorted = options.sort_indices, "built relation edges");
    Ok(RelationIndices {
        relation_indices,
        relation_weight,
        target_indices,
    })
}

/// Deduplicate a multi-hop ID tensor and build its relation graph.
pub fn to_relation(
    profile: &FanoutProfile,
    ids: &ArrayD<VertexId>,
    edge_weight: Option<&ArrayD<f32>>,
    options: RelationOptions,
) -> Result<RelationGraph> {
    profile.rows_for(ids.len())?;
    let flat: Vec<VertexId> = ids.iter().copied().collect();
    let (unique, inverse) = unique_inverse(&flat);
    let indices = ArrayD::from_shape_vec(IxDyn(ids.shape()), inverse.into_iter().map(|i| i as i64).collect())?;
    let RelationIndices {
        relation_indices,
        relation_weight,
        target_indices,
    } = relation_from_indices(profile, &indices, edge_weight, options)?;
    Ok(RelationGraph {
        unique_ids: Array1::from(unique),
        relation_indices,
        relation_weight,
        target_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn two_seed_ids() -> ArrayD<VertexId> {
        // seeds 2 and 4, fanouts [2, 3], with repeated vertices
        ArrayD::from_shape_vec(
            IxDyn(&[2, 9]),
            vec![
                2, 3, 4, 2, 5, 6, 7, 2, 3, //
                4, 2, 3, 4, 4, 5, 2, 6, 6,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_dedup_and_targets() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let ids = two_seed_ids();
        let graph = to_relation(&profile, &ids, None, RelationOptions::default()).unwrap();

        assert_eq!(graph.unique_ids.to_vec(), vec![2, 3, 4, 5, 6, 7]);
        assert_eq!(graph.num_edges(), 16);
        assert_eq!(graph.relation_indices.shape(), &[2, 16]);
        assert!(graph
            .relation_indices
            .iter()
            .all(|&i| i >= 0 && (i as usize) < graph.num_vertices()));
        assert_eq!(graph.target_indices.shape(), &[2]);
        assert_eq!(graph.target_ids().iter().copied().collect::<Vec<_>>(), vec![2, 4]);

        // every template edge maps back to the sampled IDs
        let mut e = 0;
        for row in 0..2 {
            for &(p, c) in profile.edge_template() {
                let (pi, ci) = (graph.relation_indices[[0, e]], graph.relation_indices[[1, e]]);
                assert_eq!(graph.unique_ids[pi as usize], ids[[row, p]]);
                assert_eq!(graph.unique_ids[ci as usize], ids[[row, c]]);
                e += 1;
            }
        }
    }

    #[test]
    fn test_weights_follow_edges() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let ids = two_seed_ids();
        let weights = ArrayD::from_shape_fn(IxDyn(&[2, 9]), |ix| (ix[0] * 100 + ix[1]) as f32);
        let graph = to_relation(&profile, &ids, Some(&weights), RelationOptions::default()).unwrap();
        let w = graph.relation_weight.as_ref().unwrap();
        assert_eq!(w.shape(), &[16, 1]);
        // edge 0 is (0 -> 1) of row 0; edge 8 is (0 -> 1) of row 1
        assert_eq!(w[[0, 0]], 1.0);
        assert_eq!(w[[8, 0]], 101.0);
        assert_eq!(w[[15, 0]], 108.0);

        let sorted = to_relation(&profile, &ids, Some(&weights), RelationOptions::sorted()).unwrap();
        let by_edge = |g: &RelationGraph| -> HashSet<(i64, i64, u32)> {
            g.edges()
                .zip(g.relation_weight.as_ref().unwrap().column(0).iter())
                .map(|((p, c), w)| (p, c, w.to_bits()))
                .collect()
        };
        assert_eq!(by_edge(&graph), by_edge(&sorted));
    }

    #[test]
    fn test_sort_is_stable_by_parent() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let ids = two_seed_ids();
        let unsorted = to_relation(&profile, &ids, None, RelationOptions::default()).unwrap();
        let sorted = to_relation(&profile, &ids, None, RelationOptions::sorted()).unwrap();

        let parents: Vec<i64> = sorted.relation_indices.row(0).to_vec();
        assert!(parents.windows(2).all(|w| w[0] <= w[1]));

        // ties keep their unsorted relative order
        let original: Vec<(i64, i64)> = unsorted.edges().collect();
        let mut expected = original.clone();
        expected.sort_by_key(|&(p, _)| p);
        assert_eq!(sorted.edges().collect::<Vec<_>>(), expected);

        let unstable = to_relation(
            &profile,
            &ids,
            None,
            RelationOptions {
                sort_indices: true,
                sort_stable: false,
            },
        )
        .unwrap();
        let set = |g: &RelationGraph| -> HashSet<(i64, i64)> { g.edges().collect() };
        assert_eq!(set(&unstable), set(&unsorted));
        assert_eq!(unstable.target_indices, unsorted.target_indices);
    }

    #[test]
    fn test_width_must_divide_element_count() {
        let profile = FanoutProfile::new(&[2, 3]).unwrap();
        let ids = ArrayD::from_shape_vec(IxDyn(&[10]), (0..10i64).collect()).unwrap();
        let err = to_relation(&profile, &ids, None, RelationOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch(_)));

        let ids = two_seed_ids();
        let weights = ArrayD::zeros(IxDyn(&[2, 8]));
        assert!(to_relation(&profile, &ids, Some(&weights), RelationOptions::default()).is_err());
    }

    #[test]
    fn test_flat_and_grouped_inputs() {
        let profile = FanoutProfile::new(&[2]).unwrap();
        let flat = ArrayD::from_shape_vec(IxDyn(&[6]), vec![1, 2, 3, 4, 5, 6]).unwrap();
        let graph = to_relation(&profile, &flat, None, RelationOptions::default()).unwrap();
        assert_eq!(graph.target_indices.shape(), &[2]);

        let grouped = ArrayD::from_shape_vec(IxDyn(&[2, 1, 3]), vec![1, 2, 3, 4, 5, 6]).unwrap();
        let graph = to_relation(&profile, &grouped, None, RelationOptions::default()).unwrap();
        assert_eq!(graph.target_indices.shape(), &[2, 1]);
        assert_eq!(graph.target_ids()[[1, 0]], 4);
    }
}
