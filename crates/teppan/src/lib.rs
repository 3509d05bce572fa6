//! # Teppan
//!
//! Batched dispatch of variable-length sequence batches onto a pool of
//! fixed-capacity, fixed-point accelerator engines.
//!
//! ## Overview
//!
//! Each engine accepts at most a fixed number of sequences per call and
//! works on 16-bit fixed point values. This crate turns an arbitrarily
//! sized float batch into the calls those engines need and stitches their
//! results back together in order:
//!
//! - [`tensor`] - sequences, padded float blocks and fixed point buffers
//! - [`quantization`] - the float / fixed point codec
//! - [`accelerator`] - the engine handle seam, plus an emulated engine
//! - [`pool`] - opening and owning a set of engines for one workload
//! - [`dispatch`] - partitioning a batch over the pool and running it
//! - [`encoder`] - pack, quantize, dispatch, dequantize and unpack in one call
//! - [`service`] - an async front end merging single requests into batches
//! - [`config`] - model artifacts and deployment settings
//! - [`backend`] - conversions to and from tensor libraries
//!
//! ## Assumptions
//!
//! Every block is laid out row major as `(batch, frames, channels)`:
//!  - The `0th` dimension is the batch dimension
//!  - The `1st` dimension is the frame (time step) dimension
//!  - Rows are padded at the end to the longest sequence in the batch
//!
//! ## Features
//!
//! - **candle** - conversions for `candle_core::Tensor`
//! - **burn** - conversions for rank-3 burn tensors

pub mod accelerator;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod pool;
pub mod quantization;
pub mod service;
pub mod tensor;

/// Layout constants for client reference
pub use tensor::constant;

pub use error::{DeviceRunError, DispatchError, Result};
