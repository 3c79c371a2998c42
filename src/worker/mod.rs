/*!
 * Batch workers consuming queue messages.
 *
 * A `BatchWorker` decodes each message of a batch into work units and hands
 * every unit to a stage-specific `UnitHandler`. Failures are isolated per
 * message and per unit; only a failure escaping the whole invocation makes
 * the batch eligible for redelivery.
 *
 * - `translation_stage`: fetch, translate and store one source object
 * - `completion_stage`: notify a recipient about one stored translation
 * - `runner`: polls a queue, batches messages and invokes a worker
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::FailurePolicy;
use crate::errors::{UnitError, WorkerError};
use crate::event::WorkUnit;
use crate::messaging::{QueueMessage, WorkQueue};

pub mod batch;
pub mod completion_stage;
pub mod runner;
pub mod translation_stage;

pub use self::batch::BatchWorker;
pub use self::completion_stage::CompletionStage;
pub use self::runner::{EventSourceRunner, EventSourceSettings, RunnerTotals};
pub use self::translation_stage::{RESULT_KEY_PREFIX, TranslationStage, result_key};

/// Domain work performed for a single unit
#[async_trait]
pub trait UnitHandler: Send + Sync + Debug {
    /// Stage name used in logs and dead-letter records
    fn stage(&self) -> &'static str;

    /// Process one unit from scratch; must be safe to repeat
    async fn handle(&self, unit: &WorkUnit) -> Result<UnitOutcome, UnitError>;
}

/// What a successfully handled unit produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// An object was written
    Written { bucket: String, key: String },
    /// A recipient was notified about an object
    Notified { recipient: String, key: String },
}

/// Destination of failed messages and units
#[derive(Debug, Clone, Default)]
pub enum FailureSink {
    /// Log and absorb
    #[default]
    Drop,
    /// Send a `DeadLetterRecord` to the queue
    DeadLetter(Arc<WorkQueue>),
}

impl FailureSink {
    /// Sink implementing `policy`, dead-lettering into `queue`
    pub fn for_policy(policy: FailurePolicy, queue: Arc<WorkQueue>) -> Self {
        match policy {
            FailurePolicy::Drop => Self::Drop,
            FailurePolicy::DeadLetter => Self::DeadLetter(queue),
        }
    }
}

/// Bucket and key of a failed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRef {
    pub bucket: String,
    pub key: String,
}

/// Failed message or unit handed to a dead-letter queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub stage: String,
    pub message_id: String,
    /// Unit that failed; absent when the message itself could not be decoded
    pub unit: Option<UnitRef>,
    pub error: String,
    /// Original queue message body
    pub body: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// Record for a message that could not be decoded
    pub fn for_message(stage: &str, message: &QueueMessage, error: &dyn std::error::Error) -> Self {
        Self {
            stage: stage.to_string(),
            message_id: message.message_id.clone(),
            unit: None,
            error: error.to_string(),
            body: message.body.clone(),
            failed_at: Utc::now(),
        }
    }

    /// Record for a unit whose processing failed
    pub fn for_unit(
        stage: &str,
        message: &QueueMessage,
        unit: &WorkUnit,
        error: &dyn std::error::Error,
    ) -> Self {
        Self {
            unit: Some(UnitRef {
                bucket: unit.source_bucket.clone(),
                key: unit.source_key.clone(),
            }),
            ..Self::for_message(stage, message, error)
        }
    }
}

/// Summary of one worker invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Messages in the batch
    pub messages: usize,
    /// Well-formed messages carrying no change records
    pub skipped: usize,
    pub decode_failures: usize,
    /// Units decoded from the batch
    pub units: usize,
    /// Outcomes of successful units, in unit order
    pub completed: Vec<UnitOutcome>,
    pub failed: usize,
    /// Failures handed to the dead-letter queue
    pub dead_lettered: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.completed.len()
    }
}

/// Result of one queue-triggered invocation
pub type InvocationResult = Result<BatchReport, WorkerError>;
