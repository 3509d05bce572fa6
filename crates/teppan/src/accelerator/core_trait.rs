use async_trait::async_trait;
use crate::error::DeviceRunError;

/// Error type a factory may return when an engine cannot be opened.
pub type OpenError = Box<dyn std::error::Error + Send + Sync>;

/// # AcceleratorHandle
///
/// One opened hardware engine with a fixed per-call batch capacity.
///
/// ## Buffer Layout
///
/// `input` holds `item_count` rows of `frame_count * padded_width` values and
/// `output` holds `item_count` rows of `frame_count * output_width` values,
/// both row-major. `declared_bytes` is the input size the driver is told
/// about, `item_count * frame_count * padded_width * 2`.
///
/// ## Implementation Notes
///
/// - [`batch`](Self::batch) is read once when the pool is built and must not
///   change afterwards
/// - [`run`](Self::run) writes every value of `output` in place; success is
///   signalled by returning `Ok(())`, any driver fault by a [`DeviceRunError`]
/// - Implementations wrapping a blocking driver call must keep it off the
///   async executor threads. The buffers are borrowed, so either run the call
///   with `tokio::task::block_in_place` (multi-threaded runtime only) or copy
///   them into owned vectors for `tokio::task::spawn_blocking`
/// - The pool guarantees a handle is never invoked concurrently with itself
///
/// ```
/// use async_trait::async_trait;
/// use teppan::accelerator::AcceleratorHandle;
/// use teppan::DeviceRunError;
///
/// struct Zeroes;
///
/// #[async_trait]
/// impl AcceleratorHandle for Zeroes {
///     fn batch(&self) -> usize {
///         4
///     }
///
///     async fn run(
///         &self,
///         _input: &[i16],
///         _declared_bytes: usize,
///         output: &mut [i16],
///         _frame_count: usize,
///         _item_count: usize,
///     ) -> Result<(), DeviceRunError> {
///         output.fill(0);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AcceleratorHandle: Send + Sync {
    /// Maximum number of items one call accepts
    fn batch(&self) -> usize;

    /// Runs the engine over `item_count` items.
    async fn run(
        &self,
        input: &[i16],
        declared_bytes: usize,
        output: &mut [i16],
        frame_count: usize,
        item_count: usize,
    ) -> Result<(), DeviceRunError>;
}

/// # AcceleratorFactory
///
/// Opens engines for a named workload. The pool calls
/// [`create`](Self::create) once per device id at startup.
pub trait AcceleratorFactory: Send + Sync {
    fn create(&self, workload: &str, device_id: usize) -> Result<Box<dyn AcceleratorHandle>, OpenError>;
}
