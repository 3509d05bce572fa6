use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use crate::encoder::SequenceEncoder;
use crate::error::DispatchError;
use crate::tensor::Sequence;
use super::queue_item::QueueItem;
use super::worker::WorkerSignals;

/// Drains waiting requests in groups of at most `max_batch`, encodes each
/// group as one batch and answers every request in it.
///
/// Exits once the worker is asked to stop. Requests still queued at that
/// point are dropped with their senders, so their `Pending` resolves to
/// `ServiceStopped`.
pub(crate) async fn batching_loop(
    encoder: Arc<SequenceEncoder>,
    max_batch: usize,
    poll_interval: Duration,
    signals: WorkerSignals,
    waiting_requests: Arc<Mutex<Vec<QueueItem>>>,
) {
    info!(max_batch, ?poll_interval, "encoder service started");
    while signals.is_running() {
        let items = drain_possible_requests(max_batch, &waiting_requests).await;
        if items.is_empty() {
            // nothing queued, wait for a submit or re-check after the interval
            signals.wait(poll_interval).await;
            continue;
        }

        process_batch(&encoder, items).await;
    }
    info!("encoder service stopped");
}

async fn process_batch(encoder: &SequenceEncoder, items: Vec<QueueItem>) {
    let inputs: Vec<Sequence> = items.iter().map(|item| item.input().clone()).collect();
    debug!(requests = items.len(), "encoding queued requests");

    match encoder.forward(&inputs).await {
        Ok(outputs) => {
            for (item, output) in items.into_iter().zip(outputs) {
                if item.sender().send(Ok(output)).is_err() {
                    warn!("request dropped before its result was delivered");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, requests = inputs.len(), "batch failed");
            let shared = Arc::new(e);
            for item in items {
                if item.sender().send(Err(DispatchError::BatchFailed(shared.clone()))).is_err() {
                    warn!("request dropped before its error was delivered");
                }
            }
        }
    }
}

async fn drain_possible_requests<T>(
    max_batch: usize,
    waiting_requests: &Mutex<Vec<T>>,
) -> Vec<T> {
    let mut requests = waiting_requests.lock().await;
    let take = max_batch.min(requests.len());
    requests.drain(0..take).collect()
}
