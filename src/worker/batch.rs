/*!
 * Batch processing with per-message and per-unit failure isolation.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::time::Instant;

use super::{BatchReport, DeadLetterRecord, FailureSink, UnitHandler};
use crate::errors::{MessagingError, WorkerError};
use crate::event::{Decoded, WorkUnit, decode_message};
use crate::messaging::QueueMessage;

/// Stateless worker invoked with batches of queue messages
#[derive(Debug)]
pub struct BatchWorker<H> {
    handler: H,
    failures: FailureSink,
    /// Units in flight at once within one batch
    max_concurrent_units: usize,
}

impl<H: UnitHandler> BatchWorker<H> {
    /// Create a worker processing units one at a time and dropping failures
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            failures: FailureSink::Drop,
            max_concurrent_units: 1,
        }
    }

    pub fn with_failure_sink(mut self, failures: FailureSink) -> Self {
        self.failures = failures;
        self
    }

    pub fn with_max_concurrent_units(mut self, max_concurrent_units: usize) -> Self {
        self.max_concurrent_units = max_concurrent_units.max(1);
        self
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Process every message of the batch.
    ///
    /// Decode and unit failures are absorbed according to the failure sink.
    /// An error is returned only when a dead-letter hand-off fails, in which
    /// case none of the batch may be acknowledged.
    pub async fn process_batch<'a>(&self, messages: &'a [QueueMessage]) -> Result<BatchReport, WorkerError> {
        let stage = self.handler.stage();
        let start_time = Instant::now();
        let mut report = BatchReport {
            messages: messages.len(),
            ..BatchReport::default()
        };

        let mut units: Vec<(&'a QueueMessage, WorkUnit)> = Vec::new();
        for message in messages {
            match decode_message(&message.message_id, &message.body) {
                Ok(Decoded::Units(decoded)) => {
                    units.extend(decoded.into_iter().map(|unit| (message, unit)));
                }
                Ok(Decoded::NotApplicable(reason)) => {
                    debug!("[{}] Message {} not applicable: {:?}", stage, message.message_id, reason);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("[{}] Failed to decode message {}: {}", stage, message.message_id, e);
                    report.decode_failures += 1;
                    if self.dead_letter(DeadLetterRecord::for_message(stage, message, &e))? {
                        report.dead_lettered += 1;
                    }
                }
            }
        }
        report.units = units.len();

        // Units are moved into their futures so the batch future stays Send
        let unit_futures: Vec<_> = units
            .into_iter()
            .map(|(message, unit): (&'a QueueMessage, WorkUnit)| async move {
                let result = self.handler.handle(&unit).await;
                (message, unit, result)
            })
            .collect();
        let results = stream::iter(unit_futures)
            .buffered(self.max_concurrent_units)
            .collect::<Vec<_>>()
            .await;

        for (message, unit, result) in results {
            match result {
                Ok(outcome) => {
                    debug!("[{}] Completed {}: {:?}", stage, unit, outcome);
                    report.completed.push(outcome);
                }
                Err(e) => {
                    error!("[{}] Failed to process {}: {}", stage, unit, e);
                    report.failed += 1;
                    if self.dead_letter(DeadLetterRecord::for_unit(stage, message, &unit, &e))? {
                        report.dead_lettered += 1;
                    }
                }
            }
        }

        info!(
            "[{}] Batch of {} message(s): {} unit(s), {} completed, {} failed, {} skipped, {} undecodable in {:?}",
            stage,
            report.messages,
            report.units,
            report.succeeded(),
            report.failed,
            report.skipped,
            report.decode_failures,
            start_time.elapsed()
        );

        Ok(report)
    }

    /// Hand a failure to the sink; `Ok(true)` when it was dead-lettered
    fn dead_letter(&self, record: DeadLetterRecord) -> Result<bool, WorkerError> {
        let FailureSink::DeadLetter(queue) = &self.failures else {
            return Ok(false);
        };

        let body = serde_json::to_string(&record)
            .map_err(|e| WorkerError::DeadLetter(MessagingError::Encode(e)))?;
        let id = queue.send(body).map_err(WorkerError::DeadLetter)?;
        debug!(
            "[{}] Dead-lettered message {} to '{}' as {}",
            record.stage,
            record.message_id,
            queue.name(),
            id
        );
        Ok(true)
    }
}
