//! # Batch buffers
//!
//! The data that crosses the dispatch boundary: variable-length
//! [`Sequence`]s on the caller side, the zero-padded float [`PaddedBatch`],
//! and the fixed point [`FixedPointBuffer`] / [`OutputBlock`] pair that the
//! accelerators read and write.
//!
//! All blocks are row-major `(batch, frames, width)`; see [`constant`] for the
//! reserved dimensions.

pub mod constant;
mod buffer;
mod sequence;

pub use buffer::{FixedPointBuffer, OutputBlock, PaddedBatch};
pub use sequence::{Sequence, SequencePacker};
