//! # Accelerator Handles
//!
//! The seam between the dispatcher and the hardware driver.
//!
//! * [`AcceleratorHandle`] - one opened engine: a cached batch capacity and an
//!   asynchronous `run` call over flat fixed point buffers
//! * [`AcceleratorFactory`] - opens an engine for a workload and device id
//! * [`EmulatedAccelerator`] / [`EmulatedFactory`] - a software engine with
//!   call recording and fault injection, for tests and dry runs

mod core_trait;
mod emulated;

pub use core_trait::*;
pub use emulated::{CallLog, CallRecord, EmulatedAccelerator, EmulatedFactory};
