//! # Batch Dispatch
//!
//! Splits a fixed point batch into contiguous runs sized to each engine's
//! capacity and drives them through an [`AcceleratorPool`](crate::pool::AcceleratorPool).
//!
//! * [`plan`] - the partitioning algorithm, [`DispatchPlan`] and its invariants
//! * [`dispatcher`] - [`BatchDispatcher`], which executes a plan against the pool
//!   and checks that every output row was written
//!
//! ## Example
//!
//! ```rust
//! # use std::sync::Arc;
//! use teppan::accelerator::EmulatedFactory;
//! use teppan::dispatch::BatchDispatcher;
//! use teppan::pool::AcceleratorPool;
//! use teppan::tensor::FixedPointBuffer;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> teppan::Result<()> {
//! let factory = EmulatedFactory::new(vec![4, 2], 224, 300);
//! let pool = Arc::new(AcceleratorPool::create(&factory, "openie", 2)?);
//! let dispatcher = BatchDispatcher::new(pool, 300);
//!
//! let input = FixedPointBuffer::zeros(7, 10, 224);
//! let output = dispatcher.dispatch(&input).await?;
//! assert_eq!(output.shape(), [7, 10, 300]);
//! assert_eq!(factory.log().len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod plan;
pub mod dispatcher;

pub use dispatcher::{BatchDispatcher, RoundMode};
pub use plan::{Assignment, DispatchPlan};
