/*!
 * Queue-to-worker event source.
 *
 * The runner long-polls a queue, gathers a batch bounded by size and a
 * batching window, and invokes its worker under a time budget. A batch is
 * acknowledged as a whole: every message is deleted when the invocation
 * succeeds, none when it fails or runs out of time. Unacknowledged messages
 * reappear once their visibility timeout expires.
 */

use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::{BatchReport, BatchWorker, InvocationResult, UnitHandler};
use crate::app_config::StageConfig;
use crate::errors::WorkerError;
use crate::messaging::{QueueMessage, WorkQueue};

/// Lower bound on the long-poll wait; a zero wait would make the consumer loop spin
const MIN_RECEIVE_WAIT: Duration = Duration::from_millis(10);

/// Batching and invocation settings of one queue consumer
#[derive(Debug, Clone, PartialEq)]
pub struct EventSourceSettings {
    pub batch_size: usize,
    /// How long to keep filling a batch after its first message arrived
    pub max_batching_window: Duration,
    /// Long-poll wait for the first message of a batch
    pub receive_wait_time: Duration,
    pub invocation_timeout: Duration,
}

impl Default for EventSourceSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_batching_window: Duration::from_secs(10),
            receive_wait_time: Duration::from_secs(10),
            invocation_timeout: Duration::from_secs(15),
        }
    }
}

impl From<&StageConfig> for EventSourceSettings {
    fn from(stage: &StageConfig) -> Self {
        Self {
            batch_size: stage.batch_size,
            max_batching_window: stage.batching_window(),
            receive_wait_time: stage.receive_wait_time(),
            invocation_timeout: stage.invocation_timeout(),
        }
    }
}

/// Counters accumulated over a runner's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerTotals {
    pub invocations: u64,
    pub failed_invocations: u64,
    pub timed_out_invocations: u64,
    pub messages_deleted: u64,
    pub units_completed: u64,
    pub units_failed: u64,
    pub units_dead_lettered: u64,
    pub decode_failures: u64,
    pub skipped_messages: u64,
}

impl RunnerTotals {
    fn record_success(&mut self, report: &BatchReport, deleted: usize) {
        self.invocations += 1;
        self.messages_deleted += deleted as u64;
        self.units_completed += report.succeeded() as u64;
        self.units_failed += report.failed as u64;
        self.units_dead_lettered += report.dead_lettered as u64;
        self.decode_failures += report.decode_failures as u64;
        self.skipped_messages += report.skipped as u64;
    }

    fn record_failure(&mut self, error: &WorkerError) {
        self.invocations += 1;
        self.failed_invocations += 1;
        if matches!(error, WorkerError::TimedOut { .. }) {
            self.timed_out_invocations += 1;
        }
    }
}

/// Feeds batches from a queue to a worker
#[derive(Debug)]
pub struct EventSourceRunner<H> {
    queue: Arc<WorkQueue>,
    worker: BatchWorker<H>,
    settings: EventSourceSettings,
    totals: Mutex<RunnerTotals>,
}

impl<H: UnitHandler + 'static> EventSourceRunner<H> {
    pub fn new(queue: Arc<WorkQueue>, worker: BatchWorker<H>, settings: EventSourceSettings) -> Self {
        Self {
            queue,
            worker,
            settings,
            totals: Mutex::new(RunnerTotals::default()),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn worker(&self) -> &BatchWorker<H> {
        &self.worker
    }

    pub fn totals(&self) -> RunnerTotals {
        *self.totals.lock()
    }

    /// Gather the next batch; empty when nothing arrived within the receive wait
    pub async fn collect_batch(&self) -> Vec<QueueMessage> {
        let batch_size = self.settings.batch_size.max(1);
        let mut batch = self
            .queue
            .receive(batch_size, self.settings.receive_wait_time.max(MIN_RECEIVE_WAIT))
            .await;
        if batch.is_empty() {
            return batch;
        }

        let window_end = Instant::now() + self.settings.max_batching_window;
        while batch.len() < batch_size {
            let now = Instant::now();
            if now >= window_end {
                break;
            }
            let more = self
                .queue
                .receive(batch_size - batch.len(), window_end - now)
                .await;
            if more.is_empty() {
                break;
            }
            batch.extend(more);
        }

        batch
    }

    /// Run the worker over `batch` and acknowledge it on success
    pub async fn invoke(&self, batch: &[QueueMessage]) -> InvocationResult {
        let budget = self.settings.invocation_timeout;
        let result = match tokio::time::timeout(budget, self.worker.process_batch(batch)).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::TimedOut {
                budget_ms: budget.as_millis() as u64,
            }),
        };

        match &result {
            Ok(report) => {
                let deleted = batch
                    .iter()
                    .filter(|message| self.queue.delete(&message.receipt_handle))
                    .count();
                if deleted < batch.len() {
                    debug!(
                        "Queue '{}': {} receipt(s) were stale at acknowledgement",
                        self.queue.name(),
                        batch.len() - deleted
                    );
                }
                self.totals.lock().record_success(report, deleted);
            }
            Err(e) => {
                error!(
                    "Queue '{}': invocation over {} message(s) failed, leaving them for redelivery: {}",
                    self.queue.name(),
                    batch.len(),
                    e
                );
                self.totals.lock().record_failure(e);
            }
        }

        result
    }

    /// Collect and process one batch; `None` when the queue stayed empty
    pub async fn poll_once(&self) -> Option<InvocationResult> {
        let batch = self.collect_batch().await;
        if batch.is_empty() {
            return None;
        }
        Some(self.invoke(&batch).await)
    }

    /// Poll until `shutdown` turns true, its sender is dropped or the queue closes
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Consumer for queue '{}' started", self.queue.name());
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                batch = self.collect_batch() => {
                    if !batch.is_empty() {
                        let _ = self.invoke(&batch).await;
                    } else if self.queue.is_closed() {
                        // receive returns at once on a closed queue
                        break;
                    }
                }
            }
        }
        info!("Consumer for queue '{}' stopped", self.queue.name());
    }
}
