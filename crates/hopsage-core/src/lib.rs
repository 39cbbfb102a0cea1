// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]

//! Core types for multi-hop GNN sampling.
//!
//! Mini-batch GNN training never runs message passing over the full graph.
//! Each batch of seed vertices is expanded into a fixed-shape neighborhood
//! tree, and aggregation layers consume that tree hop by hop:
//!
//! ```text
//! seeds ──hop 1 (f1 per seed)──▶ N1 ──hop 2 (f2 per parent)──▶ N2 ...
//!
//! flattened per seed: [ seed | N1 (f1) | N2 (f1*f2) | ... ]
//! ```
//!
//! Because every hop samples a *fixed* number of neighbors (with
//! replacement), the position of every sampled vertex in that flat row is a
//! pure function of the fanouts. This crate owns that arithmetic and the
//! contracts of the external services the sampler talks to:
//!
//! - [`fanout`] - widths, total width and parent/child edge template
//! - [`tensor`] - the backend-neutral ops (split, gather, unique, segment reduce)
//! - [`graph`] - [`GraphClient`] / [`FeatureStore`] traits and [`InMemoryGraph`]
//! - [`config`] - serde configuration with eager validation
//! - [`backend`] - adapters to other tensor libraries (`candle` feature)
//!
//! # Example
//!
//! ```rust
//! use hopsage_core::FanoutProfile;
//!
//! let profile = FanoutProfile::new(&[2, 3]).unwrap();
//! assert_eq!(profile.widths(), &[1, 2, 6]);
//! assert_eq!(profile.total_width(), 9);
//! assert_eq!(profile.edge_template()[2], (1, 3));
//! ```

pub mod backend;
pub mod config;
mod error;
pub mod fanout;
pub mod graph;
pub mod tensor;

pub use config::{
    DimSpec, Encoding, FeatureConfig, LabelConfig, MultiHopConfig, NegativeConfig, PipelineConfig,
    RandomWalkConfig, RelationOptions,
};
pub use error::{Error, Result};
pub use fanout::{fanout_edge_template, fanout_total_width, fanout_widths, FanoutProfile, ProfileCache};
pub use graph::{
    walk_pair_count, walk_pairs, EdgeType, FeatureStore, GraphClient, InMemoryGraph, IsolatedPolicy,
    NeighborSample, VertexId, VertexType, WalkParams,
};
pub use tensor::Reduce;

// Re-export ndarray so downstream crates agree on the version.
pub use ndarray;
