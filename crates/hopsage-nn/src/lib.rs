// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::uninlined_format_args)]

//! Model-side contracts for sampled batches.
//!
//! Message-passing layers consume what `hopsage-sample` produces. This crate
//! holds the parts of that contract that do not depend on a training
//! framework:
//!
//! - [`Aggregator`] - closed set of neighbor reductions, parsed strictly
//! - [`RoleEmbeddings`] - target / context tables, shared or independent
//!
//! # Example
//!
//! ```rust
//! use hopsage_core::ndarray::array;
//! use hopsage_nn::Aggregator;
//!
//! let features = array![[0.0f32], [2.0], [4.0]];
//! let edges = array![[0i64, 0], [1, 2]];
//! let agg: Aggregator = "mean".parse().unwrap();
//! let out = agg.aggregate_relation(features.view(), &edges, None).unwrap();
//! assert_eq!(out[[0, 0]], 3.0);
//! ```

pub mod aggregate;
pub mod embedding;

pub use aggregate::Aggregator;
pub use embedding::{ContrastiveEmbeddings, EmbeddingTable, Role, RoleEmbeddings, WeightSharing};

pub use hopsage_core::{Error, Result};
