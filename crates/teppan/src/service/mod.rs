//! # Encoder Service
//!
//! An asynchronous front end over a [`SequenceEncoder`]. Callers submit one
//! sequence at a time and await a [`Pending`] result; a background task
//! merges whatever is queued (up to `max_batch` requests) into a single
//! padded batch and dispatches it in one go.
//!
//! ```rust
//! # use std::sync::Arc;
//! use teppan::accelerator::EmulatedFactory;
//! use teppan::config::{DeploymentConfig, LayoutConfig, ModelConfig};
//! use teppan::encoder::SequenceEncoder;
//! use teppan::service::EncoderService;
//! use teppan::tensor::Sequence;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> teppan::Result<()> {
//! let config = DeploymentConfig {
//!     layout: LayoutConfig { model_input_width: 2, hardware_pad_channels: 1, output_width: 4 },
//!     ..Default::default()
//! };
//! let model = ModelConfig { input_exponent: 4, output_exponent: 4 };
//! let factory = EmulatedFactory::new(vec![8], 3, 4);
//! let encoder = Arc::new(SequenceEncoder::with_model(&config, &model, &factory)?);
//!
//! let service = EncoderService::new(encoder, &config.serving);
//! let pending = service.submit(Sequence::new(2, vec![0.5, 0.25, 1.0, 1.0])?).await;
//! let encoded = pending.await?;
//! assert_eq!(encoded.len(), 2);
//! # Ok(())
//! # }
//! ```

mod batch_loop;
mod pending;
mod queue_item;
mod worker;

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use crate::config::ServingConfig;
use crate::encoder::SequenceEncoder;
use crate::error::DispatchError;
use crate::tensor::Sequence;
use batch_loop::batching_loop;
use queue_item::QueueItem;

pub use pending::Pending;
pub use worker::{WorkerHandle, WorkerSignals};

pub struct EncoderService {
    waiting_requests: Arc<Mutex<Vec<QueueItem>>>,
    handle: WorkerHandle,
    input_width: usize,
}

impl EncoderService {
    /// Starts the background batching task. Must be called from within a
    /// tokio runtime.
    pub fn new(encoder: Arc<SequenceEncoder>, config: &ServingConfig) -> Self {
        let waiting_requests = Arc::new(Mutex::new(vec![]));
        let max_batch = config.max_batch.max(1);
        let poll_interval = config.poll_interval();
        let input_width = encoder.packer().model_input_width();

        let handle = WorkerHandle::spawn({
            let waiting_requests = waiting_requests.clone();
            move |signals| batching_loop(encoder, max_batch, poll_interval, signals, waiting_requests)
        });

        Self { waiting_requests, handle, input_width }
    }

    /// Queues `sequence` for the next batch.
    ///
    /// A sequence whose width differs from the model input width is answered
    /// right away with [`DispatchError::Shape`] and never joins a batch.
    pub async fn submit(&self, sequence: Sequence) -> Pending {
        let (tx, rx) = oneshot::channel();
        if sequence.width() != self.input_width {
            let _ = tx.send(Err(DispatchError::Shape(format!(
                "sequence has width {}, model expects {}",
                sequence.width(),
                self.input_width
            ))));
            return Pending::new(rx);
        }
        {
            let mut waiting = self.waiting_requests.lock().await;
            waiting.push(QueueItem::new(sequence, tx));
        }
        self.handle.notify();
        Pending::new(rx)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use crate::accelerator::EmulatedFactory;
    use crate::config::{DeploymentConfig, LayoutConfig, ModelConfig};

    fn deployment(max_batch: usize) -> DeploymentConfig {
        DeploymentConfig {
            layout: LayoutConfig { model_input_width: 2, hardware_pad_channels: 1, output_width: 4 },
            serving: ServingConfig { max_batch, poll_interval_ms: 20 },
            ..Default::default()
        }
    }

    const MODEL: ModelConfig = ModelConfig { input_exponent: 3, output_exponent: 3 };

    fn sequence(frames: usize, seed: f32) -> Sequence {
        let values = (0..frames * 2).map(|i| seed + i as f32 * 0.125).collect();
        Sequence::new(2, values).unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_submits_match_direct_forward() {
        let config = deployment(4);
        let factory = EmulatedFactory::new(vec![2, 1], 3, 4);
        let encoder = Arc::new(SequenceEncoder::with_model(&config, &MODEL, &factory).unwrap());
        let service = EncoderService::new(encoder.clone(), &config.serving);

        let inputs: Vec<Sequence> = (0..9).map(|i| sequence(1 + i % 4, i as f32)).collect();
        let mut pending = Vec::new();
        for input in &inputs {
            pending.push(service.submit(input.clone()).await);
        }
        let results = join_all(pending).await;

        for (input, result) in inputs.iter().zip(results) {
            let expected = encoder.forward(std::slice::from_ref(input)).await.unwrap();
            assert_eq!(result.unwrap(), expected[0]);
        }
    }

    #[tokio::test]
    async fn test_batch_failure_reaches_every_request() {
        let config = deployment(8);
        let factory = EmulatedFactory::new(vec![8], 3, 4).with_fault_at(0);
        let encoder = Arc::new(SequenceEncoder::with_model(&config, &MODEL, &factory).unwrap());
        let service = EncoderService::new(encoder, &config.serving);

        let result = service.submit(sequence(2, 0.0)).await.await;

        match result {
            Err(DispatchError::BatchFailed(inner)) => {
                assert!(matches!(*inner, DispatchError::DeviceRun { handle: 0, .. }));
            }
            other => panic!("expected a batch failure, got {other:?}"),
        }

        // the fault was one-shot, later batches go through
        assert!(service.submit(sequence(1, 0.0)).await.await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_width_does_not_fail_its_batch() {
        let config = deployment(8);
        let factory = EmulatedFactory::new(vec![8], 3, 4);
        let encoder = Arc::new(SequenceEncoder::with_model(&config, &MODEL, &factory).unwrap());
        let service = EncoderService::new(encoder.clone(), &config.serving);
        let good = sequence(2, 1.0);
        let bad = Sequence::new(3, vec![0.0; 6]).unwrap();

        let good_pending = service.submit(good.clone()).await;
        let bad_pending = service.submit(bad).await;
        let (good_result, bad_result) = futures::join!(good_pending, bad_pending);

        assert!(matches!(bad_result, Err(DispatchError::Shape(_))));
        let expected = encoder.forward(std::slice::from_ref(&good)).await.unwrap();
        assert_eq!(good_result.unwrap(), expected[0]);
    }

    #[tokio::test]
    async fn test_service_reports_running() {
        let config = deployment(2);
        let factory = EmulatedFactory::new(vec![2], 3, 4);
        let encoder = Arc::new(SequenceEncoder::with_model(&config, &MODEL, &factory).unwrap());
        let service = EncoderService::new(encoder, &config.serving);

        assert!(service.is_running());
    }
}
