use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A single hardware call failed.
///
/// Returned by [`AcceleratorHandle::run`](crate::accelerator::AcceleratorHandle::run)
/// implementations; the dispatcher wraps it into [`DispatchError::DeviceRun`]
/// together with the handle index and the rows it was working on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("device returned code {code}: {message}")]
pub struct DeviceRunError {
    /// Driver specific status code
    pub code: i32,

    /// Human readable description from the driver
    pub message: String,
}

impl DeviceRunError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Errors that can occur while building a pool or dispatching a batch.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A handle could not be created. Fatal at startup, never retried.
    #[error("failed to initialise accelerator {device_id} for workload `{workload}`: {reason}")]
    DeviceInit {
        workload: String,
        device_id: usize,
        reason: String,
    },

    /// A float value does not fit the signed 16 bit fixed point range.
    #[error("value {value} scaled by 2^{exponent} does not fit in i16")]
    Range {
        value: f32,
        exponent: i32,
    },

    /// The rows written by a dispatch do not add up to the batch size.
    #[error("dispatch wrote {written} rows, expected {expected}")]
    DispatchConsistency {
        expected: usize,
        written: usize,
    },

    /// A plan assigns more rows to a handle than it accepts per call.
    #[error("plan assigns {count} rows to accelerator {handle} with capacity {capacity}")]
    CapacityExceeded {
        handle: usize,
        count: usize,
        capacity: usize,
    },

    /// A hardware call failed; the dispatch was abandoned.
    #[error("accelerator {handle} failed on rows {start}..{end}: {source}")]
    DeviceRun {
        handle: usize,
        start: usize,
        end: usize,
        #[source]
        source: DeviceRunError,
    },

    /// A hardware call did not complete within the configured bound.
    #[error("accelerator {handle} timed out after {timeout:?} on rows {start}..{end}")]
    DeviceTimeout {
        handle: usize,
        start: usize,
        end: usize,
        timeout: Duration,
    },

    /// Model artifact or deployment configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A buffer does not match the shape it claims to have.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// The encoder service stopped before answering a request.
    #[error("encoder service stopped before answering")]
    ServiceStopped,

    /// The batch a request was merged into failed; every request in it
    /// receives the same underlying error.
    #[error("batched encode failed: {0}")]
    BatchFailed(Arc<DispatchError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Config(e.to_string())
    }
}
