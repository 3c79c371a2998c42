/*!
 * Tests for directory runs through the application controller
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use translate_relay::app_controller::{Controller, RunOptions};
use translate_relay::notify::RecordingNotifier;
use translate_relay::providers::mock::MockTranslator;
use translate_relay::storage::MemoryStore;

use crate::common;

fn run_options(input_dir: &std::path::Path, store_dir: &std::path::Path) -> RunOptions {
    RunOptions {
        output_dir: None,
        wait_timeout: Duration::from_secs(10),
        show_progress: false,
        ..RunOptions::new(input_dir, store_dir)
    }
}

#[tokio::test]
async fn test_runWithStore_shouldTranslateExportAndSummarize() -> Result<()> {
    common::init_logging();
    let input = common::create_temp_dir()?;
    let output = common::create_temp_dir()?;
    common::create_test_file(input.path(), "note.txt", "Hello")?;
    common::create_test_file(input.path(), "letters/dear friend.txt", "Thanks")?;
    common::create_test_file(input.path(), "ignored.md", "# not a text document")?;

    let notifier = RecordingNotifier::new();
    let translator = MockTranslator::working().with_mapping("Hello", "Dia dhuit");
    let controller = Controller::with_components(
        common::test_config(),
        Arc::new(translator),
        Arc::new(notifier.clone()),
    );
    let options = RunOptions {
        output_dir: Some(output.path().to_path_buf()),
        ..run_options(input.path(), input.path())
    };

    let summary = controller.run_with_store(MemoryStore::new(), &options).await?;

    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.translated, 2);
    assert_eq!(summary.notified, 2);
    assert_eq!(summary.exported, 2);
    assert_eq!(summary.translation_failures, 0);
    assert!(summary.drained);

    assert_eq!(
        fs::read_to_string(output.path().join("translated_note.txt"))?,
        "Dia dhuit"
    );
    assert_eq!(
        fs::read_to_string(output.path().join("translated_letters/dear friend.txt"))?,
        "[ga] Thanks"
    );
    assert_eq!(notifier.sent().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withFilesystemStore_shouldPersistBuckets() -> Result<()> {
    common::init_logging();
    let input = common::create_temp_dir()?;
    let store = common::create_temp_dir()?;
    common::create_test_file(input.path(), "a.txt", "alpha")?;

    let controller = Controller::with_components(
        common::test_config(),
        Arc::new(MockTranslator::working()),
        Arc::new(RecordingNotifier::new()),
    );

    let summary = controller.run(&run_options(input.path(), store.path())).await?;

    assert_eq!(summary.translated, 1);
    assert_eq!(fs::read_to_string(store.path().join("source").join("a.txt"))?, "alpha");
    assert_eq!(
        fs::read_to_string(store.path().join("results").join("translated_a.txt"))?,
        "[ga] alpha"
    );
    Ok(())
}

#[tokio::test]
async fn test_run_withFailingTranslator_shouldCountFailures() -> Result<()> {
    common::init_logging();
    let input = common::create_temp_dir()?;
    common::create_test_file(input.path(), "a.txt", "alpha")?;
    common::create_test_file(input.path(), "b.txt", "beta")?;

    let controller = Controller::with_components(
        common::test_config(),
        Arc::new(MockTranslator::failing()),
        Arc::new(RecordingNotifier::new()),
    );

    let summary = controller
        .run_with_store(MemoryStore::new(), &run_options(input.path(), input.path()))
        .await?;

    assert_eq!(summary.uploaded, 2);
    assert_eq!(summary.translated, 0);
    assert_eq!(summary.translation_failures, 2);
    assert_eq!(summary.notified, 0);
    Ok(())
}

#[tokio::test]
async fn test_run_withMissingInputDir_shouldFail() {
    let store = common::create_temp_dir().unwrap();
    let controller = Controller::with_components(
        common::test_config(),
        Arc::new(MockTranslator::working()),
        Arc::new(RecordingNotifier::new()),
    );

    let result = controller
        .run(&run_options(&store.path().join("missing"), store.path()))
        .await;

    assert!(result.is_err());
}
