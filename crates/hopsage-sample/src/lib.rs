// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

//! Multi-hop neighborhood sampling and computation-graph structuring.
//!
//! A seed batch goes through three stages:
//!
//! ```text
//! seeds [N] ──MultiHopSampler──▶ ids [N, W] ──FeatureSpec──▶ features
//!                                     │
//!                   ┌─────────────────┴──────────────────┐
//!                   ▼                                    ▼
//!          to_bipartite (dense)                 to_relation (sparse)
//!    per-hop src/dst, duplicates kept     unique IDs + [2, E] edge list
//! ```
//!
//! Both encodings are driven by the same [`FanoutProfile`] edge template, so
//! the position of every sampled vertex is known without inspecting IDs.
//!
//! - [`multi_hop`] - the sampler
//! - [`bipartite`] / [`relation`] - the two structurers
//! - [`feature`] - per-unique-ID feature lookup and gather
//! - [`negative`] - context and negative sampling
//! - [`pipeline`] - supervised / unsupervised pipelines
//! - [`loader`] - parallel batch loading on rayon
//!
//! # Example
//!
//! ```rust
//! use hopsage_core::{InMemoryGraph, MultiHopConfig, PipelineConfig};
//! use hopsage_sample::SamplingPipeline;
//!
//! let mut graph = InMemoryGraph::new(7);
//! for v in 0..8 {
//!     graph.add_undirected_edge(v, (v + 1) % 8, 0, 1.0);
//! }
//!
//! let config = PipelineConfig::new(MultiHopConfig::new(vec![vec![0], vec![0]], vec![2, 3]));
//! let pipeline = SamplingPipeline::new(&config).unwrap();
//! let out = pipeline.run_ids(&mut graph, &[2, 4]).unwrap();
//!
//! let layers = out.as_bipartite().unwrap();
//! assert_eq!(layers[0].dst.shape(), &[2, 6]);
//! assert_eq!(layers[1].dst.shape(), &[2, 2]);
//! ```
//!
//! [`FanoutProfile`]: hopsage_core::FanoutProfile

pub mod bipartite;
pub mod feature;
pub mod loader;
pub mod multi_hop;
pub mod negative;
pub mod pipeline;
pub mod relation;

#[cfg(feature = "candle")]
pub mod candle;

pub use bipartite::{to_bipartite, BipartiteLayer};
pub use feature::{fetch_labels, FeatureSpec, HopFeatures, SparseHopFeatures};
pub use loader::BatchLoader;
pub use multi_hop::{sample_multi_hop, MultiHop, MultiHopSampler};
pub use negative::{
    sample_context, ContrastiveIds, EdgeNegTransform, NegativeSampler, NeighborNegTransform, RandomWalkNegTransform,
};
pub use pipeline::{
    ContrastiveBatch, LabeledBatch, RelationBatch, SamplingPipeline, Signature, Structured, SupervisedPipeline,
    UnsupervisedPipeline,
};
pub use relation::{relation_from_indices, to_relation, RelationGraph, RelationIndices};

pub use hopsage_core::{Error, Result};
