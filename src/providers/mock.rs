/*!
 * Mock translator implementations for dry runs and testing.
 *
 * This module provides a translator that simulates different behaviors:
 * - `MockTranslator::working()` - Always succeeds, using a fixed mapping when one matches
 * - `MockTranslator::intermittent(n)` - Fails every nth request
 * - `MockTranslator::failing()` - Always fails with an error
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{TranslationRequest, Translator};
use crate::errors::{ProviderError, TranslationError};

/// Behavior mode for the mock translator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// Mock translator for testing pipeline behavior
#[derive(Debug, Clone)]
pub struct MockTranslator {
    behavior: MockBehavior,
    /// Fixed source text to translated text mapping
    mapping: HashMap<String, String>,
    /// Texts that always fail regardless of behavior
    fail_on: Vec<String>,
    /// Shared across clones
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<TranslationRequest>>>,
}

impl MockTranslator {
    /// Create a new mock translator with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            mapping: HashMap::new(),
            fail_on: Vec::new(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock translator that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create an intermittently failing mock translator
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    /// Create a failing mock translator that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock translator that waits before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Translate `source` to exactly `translated`
    pub fn with_mapping(mut self, source: impl Into<String>, translated: impl Into<String>) -> Self {
        self.mapping.insert(source.into(), translated.into());
        self
    }

    /// Fail every request whose text equals `text`
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.fail_on.push(text.into());
        self
    }

    /// Number of translate calls so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Every request received so far, in call order
    pub fn requests(&self) -> Vec<TranslationRequest> {
        self.requests.lock().clone()
    }

    fn render(&self, request: &TranslationRequest) -> String {
        self.mapping
            .get(&request.text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", request.target_language, request.text))
    }

    fn simulated_failure(message: String, status_code: u16) -> TranslationError {
        TranslationError::Provider(ProviderError::ApiError {
            status_code,
            message,
        })
    }
}

#[async_trait]
impl Translator for MockTranslator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if self.fail_on.contains(&request.text) {
            return Err(Self::simulated_failure(
                format!("Simulated failure for text '{}'", request.text),
                500,
            ));
        }

        match self.behavior {
            MockBehavior::Working => Ok(self.render(request)),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(Self::simulated_failure(
                        format!("Simulated intermittent failure (request #{})", count + 1),
                        503,
                    ))
                } else {
                    Ok(self.render(request))
                }
            }

            MockBehavior::Failing => Err(Self::simulated_failure(
                "Simulated provider failure".to_string(),
                500,
            )),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Ok(self.render(request))
            }
        }
    }
}
