/*!
 * Failure isolation and failure policy tests
 */

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use translate_relay::app_config::{Config, FailurePolicy};
use translate_relay::notify::RecordingNotifier;
use translate_relay::pipeline::Pipeline;
use translate_relay::providers::mock::MockTranslator;
use translate_relay::storage::{MemoryStore, ObjectStore};
use translate_relay::worker::DeadLetterRecord;

use crate::common::{self, FailingStore, WAIT};

fn dead_letter_config() -> Config {
    let mut config = common::test_config();
    config.failure_policy = FailurePolicy::DeadLetter;
    config
}

#[tokio::test]
async fn test_failingUnit_shouldNotAffectOthersInBatch() -> Result<()> {
    common::init_logging();
    let notifier = RecordingNotifier::new();
    let translator = MockTranslator::working().failing_on("poison");
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &common::test_config(),
        Arc::new(translator),
        Arc::new(notifier.clone()),
    )
    .await?;

    pipeline.upload("a.txt", "first").await?;
    pipeline.upload("b.txt", "poison").await?;
    pipeline.upload("c.txt", "third").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    let keys: Vec<String> = pipeline
        .store()
        .list("results")
        .await?
        .into_iter()
        .map(|meta| meta.key)
        .collect();
    assert_eq!(keys, ["translated_a.txt", "translated_c.txt"]);
    assert_eq!(notifier.sent().len(), 2);

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.units_failed, 1);
    assert_eq!(stats.translation.units_completed, 2);
    // drop policy: the failing unit's message is still acknowledged
    assert_eq!(stats.translation.failed_invocations, 0);
    assert_eq!(stats.translation_queue.deleted, 3);
    assert_eq!(stats.translation_dead_letters.sent, 0);
    Ok(())
}

#[tokio::test]
async fn test_deadLetterPolicy_shouldRecordFailedUnit() -> Result<()> {
    common::init_logging();
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &dead_letter_config(),
        Arc::new(MockTranslator::working().failing_on("poison")),
        Arc::new(RecordingNotifier::new()),
    )
    .await?;

    pipeline.upload("bad doc.txt", "poison").await?;
    pipeline.upload("good.txt", "fine").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    let records = pipeline
        .translation_dead_letters()
        .receive(10, Duration::ZERO)
        .await;
    assert_eq!(records.len(), 1);
    let record: DeadLetterRecord = serde_json::from_str(&records[0].body)?;
    assert_eq!(record.stage, "translation");
    let unit = record.unit.expect("unit reference");
    assert_eq!(unit.bucket, "source");
    assert_eq!(unit.key, "bad doc.txt");
    assert!(record.error.contains("Simulated failure"));

    assert!(pipeline.store().get("results", "translated_good.txt").await.is_ok());
    pipeline.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_malformedMessage_shouldBeIsolatedFromValidOnes() -> Result<()> {
    common::init_logging();
    let notifier = RecordingNotifier::new();
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &dead_letter_config(),
        Arc::new(MockTranslator::working()),
        Arc::new(notifier.clone()),
    )
    .await?;

    pipeline.translation_queue().send("definitely not an envelope")?;
    pipeline
        .translation_queue()
        .send(r#"{"Type":"Notification","Message":"{\"Event\":\"s3:TestEvent\"}"}"#)?;
    pipeline.upload("ok.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    assert_eq!(notifier.sent().len(), 1);

    let records = pipeline
        .translation_dead_letters()
        .receive(10, Duration::ZERO)
        .await;
    assert_eq!(records.len(), 1);
    let record: DeadLetterRecord = serde_json::from_str(&records[0].body)?;
    assert!(record.unit.is_none());
    assert_eq!(record.body, "definitely not an envelope");

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.decode_failures, 1);
    assert_eq!(stats.translation.skipped_messages, 1);
    assert_eq!(stats.translation.units_completed, 1);
    assert_eq!(stats.translation_queue.deleted, 3);
    Ok(())
}

#[tokio::test]
async fn test_unreadableSource_shouldFailOnlyThatUnit() -> Result<()> {
    common::init_logging();
    let store = FailingStore::new().fail_get_of("locked.txt");
    let pipeline = Pipeline::start(
        store,
        &common::test_config(),
        Arc::new(MockTranslator::working()),
        Arc::new(RecordingNotifier::new()),
    )
    .await?;

    pipeline.upload("locked.txt", "secret").await?;
    pipeline.upload("open.txt", "public").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    assert!(pipeline.store().get("results", "translated_locked.txt").await.is_err());
    assert_eq!(
        common::read_text(&**pipeline.store(), "results", "translated_open.txt").await?,
        "[ga] public"
    );

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.units_failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_resultWriteFailure_shouldSkipNotification() -> Result<()> {
    common::init_logging();
    let notifier = RecordingNotifier::new();
    let store = FailingStore::new().fail_put_of("translated_doomed.txt");
    let pipeline = Pipeline::start(
        store,
        &common::test_config(),
        Arc::new(MockTranslator::working()),
        Arc::new(notifier.clone()),
    )
    .await?;

    pipeline.upload("doomed.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    assert!(notifier.sent().is_empty());
    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.units_failed, 1);
    assert_eq!(stats.completion_queue.sent, 0);
    Ok(())
}

#[tokio::test]
async fn test_notificationFailure_shouldBeDeadLetteredOnCompletionStage() -> Result<()> {
    common::init_logging();
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &dead_letter_config(),
        Arc::new(MockTranslator::working()),
        Arc::new(RecordingNotifier::failing()),
    )
    .await?;

    pipeline.upload("note.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    let records = pipeline
        .completion_dead_letters()
        .receive(10, Duration::ZERO)
        .await;
    assert_eq!(records.len(), 1);
    let record: DeadLetterRecord = serde_json::from_str(&records[0].body)?;
    assert_eq!(record.stage, "completion");
    assert_eq!(record.unit.map(|u| u.key).as_deref(), Some("translated_note.txt"));

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.units_completed, 1);
    assert_eq!(stats.completion.units_failed, 1);
    Ok(())
}

#[tokio::test]
async fn test_closedDeadLetterQueue_shouldFailInvocationAndRedeliver() -> Result<()> {
    common::init_logging();
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &dead_letter_config(),
        Arc::new(MockTranslator::working().failing_on("poison")),
        Arc::new(RecordingNotifier::new()),
    )
    .await?;
    pipeline.translation_dead_letters().close();

    pipeline.upload("bad.txt", "poison").await?;
    // Never idle: the batch keeps coming back
    assert!(!pipeline.wait_idle(Duration::from_millis(2500)).await);

    let stats = pipeline.shutdown().await;
    assert!(stats.translation.failed_invocations >= 1);
    assert_eq!(stats.translation.timed_out_invocations, 0);
    assert_eq!(stats.translation_queue.deleted, 0);
    Ok(())
}
