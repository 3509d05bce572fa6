//! Lifecycle of the background task that drains the request queue.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// The task side of a [`WorkerHandle`]: a stop flag and a wake-up channel.
#[derive(Clone)]
pub struct WorkerSignals {
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
}

impl WorkerSignals {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notifier: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleeps until woken or until `poll_interval` passes, whichever is first.
    ///
    /// Returns `true` if woken by a notification. A wake-up sent while the
    /// task was busy is kept and returns immediately.
    pub async fn wait(&self, poll_interval: Duration) -> bool {
        tokio::time::timeout(poll_interval, self.notifier.notified())
            .await
            .is_ok()
    }
}

/// Owns a spawned worker task.
///
/// Dropping the handle clears the running flag and wakes the task so it can
/// leave its loop; the task itself is not aborted.
pub struct WorkerHandle {
    signals: WorkerSignals,
    task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns `worker` on the current tokio runtime.
    pub fn spawn<F, Fut>(worker: F) -> Self
    where
        F: FnOnce(WorkerSignals) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signals = WorkerSignals::new();
        let task = tokio::spawn(worker(signals.clone()));
        Self { signals, task: Some(task) }
    }

    /// Wakes the task to look at the queue.
    pub fn notify(&self) {
        self.signals.notifier.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.signals.is_running()
    }

    /// Asks the task to stop. Later calls are no-ops.
    pub fn shutdown(&mut self) {
        self.signals.running.store(false, Ordering::SeqCst);
        self.signals.notifier.notify_one();

        if let Some(task) = self.task.take() {
            // a panic inside the task surfaces here
            tokio::spawn(async move {
                if let Err(e) = task.await {
                    tracing::error!(error = %e, "worker task ended abnormally");
                }
            });
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
