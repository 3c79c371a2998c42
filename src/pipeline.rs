/*!
 * Assembly of the two-stage translation pipeline.
 *
 * ```text
 * source bucket --created--> new-translation topic --> txt-created-queue --> translation worker
 *        result bucket <------------------------------------------------------------'
 *        result bucket --created--> complete-translation topic --> mailer-queue --> completion worker
 * ```
 *
 * Each queue has a dead-letter queue receiving messages that exceed the
 * receive limit, and units that fail under the `dead_letter` policy.
 */

use bytes::Bytes;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app_config::{Config, StageConfig};
use crate::errors::{AppError, StoreError};
use crate::messaging::{QueueConfig, QueueStats, Topic, WorkQueue};
use crate::notify::Notifier;
use crate::providers::Translator;
use crate::storage::{NotifyingStore, ObjectMeta, ObjectStore};
use crate::worker::{
    BatchWorker, CompletionStage, EventSourceRunner, EventSourceSettings, FailureSink,
    RunnerTotals, TranslationStage,
};

pub const SOURCE_TOPIC: &str = "new-translation";
pub const RESULT_TOPIC: &str = "complete-translation";
pub const TRANSLATION_QUEUE: &str = "txt-created-queue";
pub const COMPLETION_QUEUE: &str = "mailer-queue";

/// Interval at which `wait_idle` samples the queues
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Snapshot of queue and consumer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub translation_queue: QueueStats,
    pub translation_dead_letters: QueueStats,
    pub completion_queue: QueueStats,
    pub completion_dead_letters: QueueStats,
    pub translation: RunnerTotals,
    pub completion: RunnerTotals,
}

impl PipelineStats {
    /// Whether no message is waiting or being processed in either stage
    pub fn is_idle(&self) -> bool {
        self.translation_queue.is_drained() && self.completion_queue.is_drained()
    }
}

/// Queue and dead-letter queue of one stage
struct StageQueues {
    queue: Arc<WorkQueue>,
    dead_letters: Arc<WorkQueue>,
}

impl StageQueues {
    fn new(name: &str, stage: &StageConfig) -> Self {
        let dead_letters = Arc::new(WorkQueue::new(format!("{}-dlq", name), QueueConfig::default()));
        let queue = WorkQueue::new(
            name,
            QueueConfig {
                visibility_timeout: stage.visibility_timeout(),
                max_receive_count: stage.max_receive_count,
            },
        )
        .with_dead_letter_queue(dead_letters.clone());
        Self {
            queue: Arc::new(queue),
            dead_letters,
        }
    }
}

/// Running pipeline over an object store
pub struct Pipeline<S> {
    store: Arc<NotifyingStore<S>>,
    source_bucket: String,
    result_bucket: String,
    translation: Arc<EventSourceRunner<TranslationStage>>,
    completion: Arc<EventSourceRunner<CompletionStage>>,
    translation_dead_letters: Arc<WorkQueue>,
    completion_dead_letters: Arc<WorkQueue>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: ObjectStore + 'static> Pipeline<S> {
    /// Wire both stages over `store` and start their consumers
    pub async fn start(
        store: S,
        config: &Config,
        translator: Arc<dyn Translator>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let translation_settings = config.translation_worker_settings()?;
        let completion_settings = config.completion_worker_settings()?;

        let store = Arc::new(NotifyingStore::new(store));
        store.create_bucket(&config.source_bucket).await?;
        store.create_bucket(&config.result_bucket).await?;

        let source_topic = Arc::new(Topic::new(SOURCE_TOPIC, "New Translation topic"));
        let result_topic = Arc::new(Topic::new(RESULT_TOPIC, "Complete Translation topic"));

        let translation_queues = StageQueues::new(TRANSLATION_QUEUE, &config.translation_queue);
        let completion_queues = StageQueues::new(COMPLETION_QUEUE, &config.completion_queue);
        source_topic.subscribe(translation_queues.queue.clone());
        result_topic.subscribe(completion_queues.queue.clone());
        store.on_object_created(&config.source_bucket, source_topic);
        store.on_object_created(&config.result_bucket, result_topic);

        let shared_store: Arc<dyn ObjectStore> = store.clone();

        let translation_worker = BatchWorker::new(TranslationStage::new(
            shared_store.clone(),
            translator,
            translation_settings,
        ))
        .with_failure_sink(FailureSink::for_policy(
            config.failure_policy,
            translation_queues.dead_letters.clone(),
        ))
        .with_max_concurrent_units(config.max_concurrent_units);

        let completion_worker = BatchWorker::new(CompletionStage::new(
            shared_store,
            notifier,
            completion_settings,
        ))
        .with_failure_sink(FailureSink::for_policy(
            config.failure_policy,
            completion_queues.dead_letters.clone(),
        ))
        .with_max_concurrent_units(config.max_concurrent_units);

        let translation = Arc::new(EventSourceRunner::new(
            translation_queues.queue.clone(),
            translation_worker,
            EventSourceSettings::from(&config.translation_queue),
        ));
        let completion = Arc::new(EventSourceRunner::new(
            completion_queues.queue.clone(),
            completion_worker,
            EventSourceSettings::from(&config.completion_queue),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(translation.clone().run(shutdown_rx.clone())),
            tokio::spawn(completion.clone().run(shutdown_rx)),
        ];

        info!(
            "Pipeline started: {} -> {} ({}), failure policy {}",
            config.source_bucket, config.result_bucket, config.target_language, config.failure_policy
        );

        Ok(Self {
            store,
            source_bucket: config.source_bucket.clone(),
            result_bucket: config.result_bucket.clone(),
            translation,
            completion,
            translation_dead_letters: translation_queues.dead_letters,
            completion_dead_letters: completion_queues.dead_letters,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn store(&self) -> &Arc<NotifyingStore<S>> {
        &self.store
    }

    pub fn source_bucket(&self) -> &str {
        &self.source_bucket
    }

    pub fn result_bucket(&self) -> &str {
        &self.result_bucket
    }

    pub fn translation_queue(&self) -> &Arc<WorkQueue> {
        self.translation.queue()
    }

    pub fn completion_queue(&self) -> &Arc<WorkQueue> {
        self.completion.queue()
    }

    pub fn translation_dead_letters(&self) -> &Arc<WorkQueue> {
        &self.translation_dead_letters
    }

    pub fn completion_dead_letters(&self) -> &Arc<WorkQueue> {
        &self.completion_dead_letters
    }

    /// Write a document into the source bucket, triggering its translation
    pub async fn upload(&self, key: &str, content: impl Into<Bytes>) -> Result<ObjectMeta, StoreError> {
        let meta = self.store.put(&self.source_bucket, key, content.into()).await?;
        debug!("Uploaded {}/{} ({} bytes)", meta.bucket, meta.key, meta.size);
        Ok(meta)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            translation_queue: self.translation.queue().stats(),
            translation_dead_letters: self.translation_dead_letters.stats(),
            completion_queue: self.completion.queue().stats(),
            completion_dead_letters: self.completion_dead_letters.stats(),
            translation: self.translation.totals(),
            completion: self.completion.totals(),
        }
    }

    /// Wait until both stages have nothing queued or in flight.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut idle_samples = 0;
        loop {
            if self.stats().is_idle() {
                idle_samples += 1;
                // Two consecutive samples, so a hand-off between stages is not mistaken for idleness
                if idle_samples >= 2 {
                    return true;
                }
            } else {
                idle_samples = 0;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Stop both consumers and wait for them to finish
    pub async fn shutdown(self) -> PipelineStats {
        let _ = self.shutdown.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        let stats = self.stats();
        info!(
            "Pipeline stopped: {} translated, {} translation failure(s), {} notified, {} notification failure(s)",
            stats.translation.units_completed,
            stats.translation.units_failed,
            stats.completion.units_completed,
            stats.completion.units_failed
        );
        stats
    }
}
