//! # Tensor Backends
//!
//! Bridges between tensor libraries and the packed blocks the encoder works
//! on. A model upstream of the accelerators typically hands over a
//! `[batch, frames, features]` float tensor plus the true length of each
//! row; [`SequenceTensor::to_padded_batch`] turns that into a
//! [`PaddedBatch`](crate::tensor::PaddedBatch), and
//! [`SequenceTensor::from_sequences`] turns encoded sequences back into a
//! tensor.
//!
//! ## Feature Flags
//!
//! - `candle`: implements [`SequenceTensor`] for `candle_core::Tensor`
//! - `burn`: implements [`SequenceTensor`] for rank-3 `burn::tensor::Tensor`

mod core_trait;

#[cfg_attr(docsrs, doc(cfg(feature = "candle")))]
#[cfg(feature = "candle")]
/// Candle tensor backend implementation.
///
/// Only available with the `candle` feature. Any dtype is accepted on the
/// way in and converted to `f32`.
pub mod candle;

#[cfg_attr(docsrs, doc(cfg(feature = "burn")))]
#[cfg(feature = "burn")]
/// Burn tensor backend implementation.
///
/// Only available with the `burn` feature.
pub mod burn;

pub use core_trait::*;
