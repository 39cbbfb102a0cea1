//! Error types for hopsage.

use thiserror::Error;

/// Errors raised while configuring, sampling or structuring a batch.
///
/// Every variant aborts the current batch: the pipeline never returns
/// partially filled tensors.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (fanouts, metapath, feature dims, ...).
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A hop RPC came back empty for a non-empty parent set.
    #[error("sampling failed at hop {hop}: empty response for {parents} parent vertices")]
    Sampling { hop: usize, parents: usize },

    /// Any other sampling failure reported by the graph-serving client.
    #[error("sampling failed: {0}")]
    SamplingMsg(String),

    /// Feature lookup failed (unknown name, out-of-range ID, bad response).
    #[error("feature lookup failed: {0}")]
    Feature(String),

    /// Shape invariant violation between sampled and structured tensors.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Reshape rejected by ndarray.
    #[error("tensor error: {0}")]
    Tensor(#[from] ndarray::ShapeError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle tensor error.
    #[cfg(feature = "candle")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl Error {
    /// Whether the error is a configuration problem (fatal before any RPC).
    pub fn is_config(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Whether the error came from the graph-serving client.
    pub fn is_sampling(&self) -> bool {
        matches!(self, Error::Sampling { .. } | Error::SamplingMsg(_))
    }
}

/// Result type alias for hopsage.
pub type Result<T> = std::result::Result<T, Error>;
