//! Adapters from the `ndarray` core to other numeric backends.
//!
//! The index arithmetic is never duplicated per backend: adapters only move
//! finished arrays across.

#[cfg(feature = "candle")]
pub mod candle;
