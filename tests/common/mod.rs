/*!
 * Common test utilities for the translate-relay test suite
 */

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use translate_relay::app_config::{Config, NotificationConfig, StageConfig, TranslationProvider};
use translate_relay::errors::{StoreError, TranslationError};
use translate_relay::providers::{TranslationRequest, Translator};
use translate_relay::storage::{ByteStream, MemoryStore, ObjectMeta, ObjectStore, collect_bytes};

/// Upper bound for waiting on the pipeline in tests
pub const WAIT: Duration = Duration::from_secs(10);

/// Route library logs to the test output; safe to call repeatedly
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Stage settings that keep tests fast: no batching window, one second budget
pub fn fast_stage() -> StageConfig {
    StageConfig {
        batch_size: 10,
        max_batching_window_secs: 0,
        receive_wait_time_secs: 1,
        visibility_timeout_secs: 2,
        invocation_timeout_secs: 1,
        max_receive_count: None,
    }
}

/// Configuration for pipeline tests, translating to Irish
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.source_bucket = "source".to_string();
    config.result_bucket = "results".to_string();
    config.target_language = "ga".to_string();
    config.translation_queue = fast_stage();
    config.completion_queue = fast_stage();
    config.translation.provider = TranslationProvider::Mock;
    config.notification = NotificationConfig {
        recipient: "ops@example.com".to_string(),
        outbox_dir: None,
    };
    config
}

/// Read an object as UTF-8 text
pub async fn read_text(store: &dyn ObjectStore, bucket: &str, key: &str) -> Result<String> {
    let bytes = collect_bytes(store.get(bucket, key).await?).await?;
    Ok(String::from_utf8(bytes)?)
}

/// Memory store failing reads or writes of chosen keys
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_get: Mutex<HashSet<String>>,
    fail_put: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_get_of(self, key: &str) -> Self {
        self.fail_get.lock().insert(key.to_string());
        self
    }

    pub fn fail_put_of(self, key: &str) -> Self {
        self.fail_put.lock().insert(key.to_string());
        self
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.inner.create_bucket(bucket).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError> {
        if self.fail_get.lock().contains(key) {
            return Err(StoreError::Read(format!("simulated read failure for {}", key)));
        }
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, content: Bytes) -> Result<ObjectMeta, StoreError> {
        if self.fail_put.lock().contains(key) {
            return Err(StoreError::Write(format!("simulated write failure for {}", key)));
        }
        self.inner.put(bucket, key, content).await
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        self.inner.list(bucket).await
    }
}

/// Translator that stalls on its first `stalls` calls and answers afterwards
#[derive(Debug, Clone)]
pub struct StallingTranslator {
    stalls: usize,
    stall_for: Duration,
    calls: Arc<AtomicUsize>,
}

impl StallingTranslator {
    pub fn new(stalls: usize, stall_for: Duration) -> Self {
        Self {
            stalls,
            stall_for,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for StallingTranslator {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.stalls {
            tokio::time::sleep(self.stall_for).await;
        }
        Ok(format!("[{}] {}", request.target_language, request.text))
    }
}
