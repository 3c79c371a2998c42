/*!
 * End-to-end tests through both pipeline stages
 */

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use translate_relay::notify::RecordingNotifier;
use translate_relay::pipeline::Pipeline;
use translate_relay::providers::mock::MockTranslator;
use translate_relay::storage::{MemoryStore, ObjectStore};
use translate_relay::worker::result_key;

use crate::common::{self, StallingTranslator, WAIT};

async fn start(
    translator: MockTranslator,
    notifier: RecordingNotifier,
) -> Result<Pipeline<MemoryStore>> {
    common::init_logging();
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &common::test_config(),
        Arc::new(translator),
        Arc::new(notifier),
    )
    .await?;
    Ok(pipeline)
}

#[tokio::test]
async fn test_upload_shouldTranslateAndNotifyOnce() -> Result<()> {
    let notifier = RecordingNotifier::new();
    let translator = MockTranslator::working().with_mapping("Hello", "Dia dhuit");
    let pipeline = start(translator.clone(), notifier.clone()).await?;

    pipeline.upload("note.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    let text = common::read_text(&**pipeline.store(), "results", "translated_note.txt").await?;
    assert_eq!(text, "Dia dhuit");

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "ops@example.com");
    assert_eq!(sent[0].subject, "Translation complete: translated_note.txt");
    assert!(sent[0].body.contains("Dia dhuit"));

    let requests = translator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].source_language, "auto");
    assert_eq!(requests[0].target_language, "ga");

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.units_completed, 1);
    assert_eq!(stats.completion.units_completed, 1);
    assert_eq!(stats.translation_queue.deleted, 1);
    assert_eq!(stats.completion_queue.deleted, 1);
    Ok(())
}

#[tokio::test]
async fn test_upload_withPlusAndUnicodeInKey_shouldKeepKeyIntact() -> Result<()> {
    let notifier = RecordingNotifier::new();
    let pipeline = start(MockTranslator::working(), notifier.clone()).await?;
    let key = "reports/résumé+final 2024 📄.txt";

    pipeline.upload(key, "Bonjour").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    let expected_key = result_key(key);
    assert_eq!(expected_key, "translated_reports/résumé+final 2024 📄.txt");
    let text = common::read_text(&**pipeline.store(), "results", &expected_key).await?;
    assert_eq!(text, "[ga] Bonjour");
    assert_eq!(notifier.sent()[0].subject, format!("Translation complete: {}", expected_key));

    pipeline.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_upload_sameDocumentTwice_shouldOverwriteResult() -> Result<()> {
    let notifier = RecordingNotifier::new();
    let translator = MockTranslator::working().with_mapping("Hello", "Dia dhuit");
    let pipeline = start(translator.clone(), notifier.clone()).await?;

    pipeline.upload("note.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);
    pipeline.upload("note.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    let results = pipeline.store().list("results").await?;
    assert_eq!(results.len(), 1);
    assert_eq!(
        common::read_text(&**pipeline.store(), "results", "translated_note.txt").await?,
        "Dia dhuit"
    );
    assert_eq!(translator.request_count(), 2);
    assert_eq!(notifier.sent().len(), 2);

    pipeline.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_upload_manyDocuments_shouldTranslateEach() -> Result<()> {
    let notifier = RecordingNotifier::new();
    let pipeline = start(MockTranslator::working(), notifier.clone()).await?;

    for i in 0..12 {
        pipeline.upload(&format!("doc-{:02}.txt", i), format!("text {}", i)).await?;
    }
    assert!(pipeline.wait_idle(WAIT).await);

    let results = pipeline.store().list("results").await?;
    assert_eq!(results.len(), 12);
    assert_eq!(results[0].key, "translated_doc-00.txt");
    assert_eq!(notifier.sent().len(), 12);

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.units_completed, 12);
    // batch size 10 needs at least two invocations
    assert!(stats.translation.invocations >= 2);
    Ok(())
}

#[tokio::test]
async fn test_invocationTimeout_shouldRedeliverAndEventuallyTranslate() -> Result<()> {
    common::init_logging();
    let notifier = RecordingNotifier::new();
    let translator = StallingTranslator::new(1, Duration::from_secs(3));
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &common::test_config(),
        Arc::new(translator.clone()),
        Arc::new(notifier.clone()),
    )
    .await?;

    pipeline.upload("slow.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    assert_eq!(
        common::read_text(&**pipeline.store(), "results", "translated_slow.txt").await?,
        "[ga] Hello"
    );
    assert_eq!(translator.calls(), 2);
    assert_eq!(notifier.sent().len(), 1);

    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation.timed_out_invocations, 1);
    assert_eq!(stats.translation.units_completed, 1);
    Ok(())
}

#[tokio::test]
async fn test_receiveLimit_shouldMoveStuckMessageToDeadLetters() -> Result<()> {
    common::init_logging();
    let mut config = common::test_config();
    config.translation_queue.max_receive_count = Some(2);
    let translator = StallingTranslator::new(usize::MAX, Duration::from_secs(3));
    let pipeline = Pipeline::start(
        MemoryStore::new(),
        &config,
        Arc::new(translator.clone()),
        Arc::new(RecordingNotifier::new()),
    )
    .await?;

    pipeline.upload("stuck.txt", "Hello").await?;
    assert!(pipeline.wait_idle(WAIT).await);

    assert_eq!(translator.calls(), 2);
    let stats = pipeline.shutdown().await;
    assert_eq!(stats.translation_queue.dead_lettered, 1);
    assert_eq!(stats.translation_dead_letters.visible, 1);
    assert_eq!(stats.translation.units_completed, 0);
    Ok(())
}
