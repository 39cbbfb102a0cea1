//! Multi-hop neighbor sampling.
//!
//! One call expands a seed batch along a metapath: hop `h` asks the graph
//! client for `fanouts[h]` neighbors of every vertex sampled at hop `h - 1`.
//! Parents are never deduplicated, so child `j` of flattened parent `p`
//! always lands at a position the [`FanoutProfile`] edge template predicts.
//!
//! ```text
//! seeds [2, 4], fanouts [2, 3]
//!
//! ids = [[2, a, b, a1, a2, a3, b1, b2, b3],
//!        [4, c, d, c1, c2, c3, d1, d2, d3]]      shape [2, 9]
//! ```

use hopsage_core::graph::{EdgeType, GraphClient, VertexId};
use hopsage_core::ndarray::{Array1, Array2, ArrayD, Axis, IxDyn, Slice};
use hopsage_core::tensor::reshape;
use hopsage_core::{Error, FanoutProfile, MultiHopConfig, Result};
use std::sync::Arc;

/// IDs (and optional weights) of one multi-hop expansion.
///
/// `ids` has shape `seeds.shape + [total_width]`; position 0 of the last
/// axis is the seed itself, whose weight is `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiHop {
    pub ids: ArrayD<VertexId>,
    pub edge_weight: Option<ArrayD<f32>>,
}

impl MultiHop {
    /// Shape of the seed batch that produced this result.
    pub fn seed_shape(&self) -> &[usize] {
        let shape = self.ids.shape();
        &shape[..shape.len() - 1]
    }

    /// Number of seed rows.
    pub fn num_rows(&self) -> usize {
        self.seed_shape().iter().product()
    }
}

/// Reusable sampler for one metapath/fanout configuration.
#[derive(Debug, Clone)]
pub struct MultiHopSampler {
    metapath: Vec<Vec<EdgeType>>,
    edge_weight: bool,
    profile: Arc<FanoutProfile>,
}

impl MultiHopSampler {
    /// Validate the configuration and fetch its profile from the cache.
    pub fn new(config: &MultiHopConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            metapath: config.metapath.clone(),
            edge_weight: config.edge_weight,
            profile: FanoutProfile::cached(&config.fanouts)?,
        })
    }

    pub fn profile(&self) -> &Arc<FanoutProfile> {
        &self.profile
    }

    pub fn metapath(&self) -> &[Vec<EdgeType>] {
        &self.metapath
    }

    pub fn with_weight(&self) -> bool {
        self.edge_weight
    }

    /// Sample the multi-hop neighborhood of every seed.
    ///
    /// Hops run strictly in order; an empty response for a non-empty parent
    /// set fails the whole call with [`Error::Sampling`].
    pub fn sample<C: GraphClient>(&self, client: &mut C, seeds: &ArrayD<VertexId>) -> Result<MultiHop> {
        let seed_shape = seeds.shape().to_vec();
        let flat: Vec<VertexId> = seeds.iter().copied().collect();
        let (ids, weights) = self.sample_flat(client, &flat)?;

        let mut shape = seed_shape;
        shape.push(self.profile.total_width());
        let ids = reshape(ids.into_dyn(), &shape)?;
        let edge_weight = weights
            .map(|w| reshape(w.into_dyn(), &shape))
            .transpose()?;
        Ok(MultiHop { ids, edge_weight })
    }

    fn sample_flat<C: GraphClient>(
        &self,
        client: &mut C,
        seeds: &[VertexId],
    ) -> Result<(Array2<VertexId>, Option<Array2<f32>>)> {
        let rows = seeds.len();
        let width = self.profile.total_width();
        let mut ids = Array2::<VertexId>::zeros((rows, width));
        let mut weights = self.edge_weight.then(|| Array2::<f32>::zeros((rows, width)));

        if rows == 0 {
            return Ok((ids, weights));
        }

        ids.column_mut(0).assign(&Array1::from(seeds.to_vec()));
        if let Some(w) = weights.as_mut() {
            w.column_mut(0).fill(1.0);
        }

        let mut parents: Vec<VertexId> = seeds.to_vec();
        for (i, edge_types) in self.metapath.iter().enumerate() {
            let hop = i + 1;
            let fanout = self.profile.fanout_at(hop);
            tracing::debug!(hop, parents = parents.len(), fanout, "sampling hop");

            let response = client.sample_neighbors(&parents, edge_types, fanout, self.edge_weight)?;
            if response.is_empty() {
                tracing::warn!(hop, parents = parents.len(), "empty neighbor response");
                return Err(Error::Sampling {
                    hop,
                    parents: parents.len(),
                });
            }
            if response.ids.dim() != (parents.len(), fanout) {
                return Err(Error::ShapeMismatch(format!(
                    "hop {} expected neighbors of shape [{}, {}], got {:?}",
                    hop,
                    parents.len(),
                    fanout,
                    response.ids.shape()
                )));
            }

            // [rows * widths[h-1], fanout] -> [rows, widths[h]], row-major per seed
            let segment = self.profile.segment(hop);
            let hop_width = segment.len();
            let hop_ids = response
                .ids
                .as_standard_layout()
                .into_owned()
                .into_shape_with_order((rows, hop_width))?;
            ids.slice_axis_mut(Axis(1), Slice::from(segment.clone()))
                .assign(&hop_ids);

            if let Some(w) = weights.as_mut() {
                let hop_weights = response.weights.ok_or_else(|| {
                    Error::ShapeMismatch(format!("hop {} returned no weights", hop))
                })?;
                if hop_weights.dim() != (parents.len(), fanout) {
                    return Err(Error::ShapeMismatch(format!(
                        "hop {} weights have shape {:?}",
                        hop,
                        hop_weights.shape()
                    )));
                }
                let hop_weights = hop_weights
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order((rows, hop_width))?;
                w.slice_axis_mut(Axis(1), Slice::from(segment))
                    .assign(&hop_weights);
            }

            parents = hop_ids.iter().copied().collect();
        }
        Ok((ids, weights))
    }
}

/// One-shot multi-hop sampling.
///
/// `seed_ids` is flattened; the result has shape `[len(seed_ids), total_width]`.
pub fn sample_multi_hop<C: GraphClient>(
    client: &mut C,
    seed_ids: &[VertexId],
    metapath: &[Vec<EdgeType>],
    fanouts: &[usize],
    with_weight: bool,
) -> Result<MultiHop> {
    let config = MultiHopConfig::new(metapath.to_vec(), fanouts.to_vec()).with_edge_weight(with_weight);
    let sampler = MultiHopSampler::new(&config)?;
    let seeds = ArrayD::from_shape_vec(IxDyn(&[seed_ids.len()]), seed_ids.to_vec())?;
    sampler.sample(client, &seeds)
}
