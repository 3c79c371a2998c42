/*!
 * Translation capability and its provider implementations.
 *
 * - Ollama: Local LLM server
 * - Anthropic: Anthropic API integration
 * - Mock: deterministic translator for dry runs and tests
 *
 * All HTTP providers share one lazily-initialized connection pool for the
 * lifetime of the process.
 */

use async_trait::async_trait;
use log::warn;
use once_cell::sync::Lazy;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::{ProviderError, TranslationError};
use crate::language_utils::{self, AUTO_DETECT};

pub mod anthropic;
pub mod mock;
pub mod ollama;

pub use self::anthropic::Anthropic;
pub use self::mock::{MockBehavior, MockTranslator};
pub use self::ollama::Ollama;

/// Process-wide HTTP client shared by every provider
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
});

/// Handle to the shared HTTP client
pub fn shared_http_client() -> Client {
    HTTP_CLIENT.clone()
}

/// One translation call
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub text: String,
    /// ISO code or `auto`
    pub source_language: String,
    pub target_language: String,
}

impl TranslationRequest {
    pub fn new(
        text: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
        }
    }

    /// Request with automatic source language detection
    pub fn auto_detect(text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self::new(text, AUTO_DETECT, target_language)
    }
}

/// Translation capability
///
/// Implementations must be safe to call concurrently; the same text may be
/// translated more than once when a message is redelivered.
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Translate `request.text` into `request.target_language`
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError>;
}

/// Retry settings for transient provider failures.
///
/// Retries are off unless configured: queue redelivery already retries a
/// failed unit, and in-process retries count against the invocation budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_base_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given attempt with up to 50% jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = if base > 1 {
            rand::rng().random_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

/// Run `operation`, retrying transient errors according to `policy`
pub async fn with_retry<T, F, Fut>(
    provider: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{} request failed (attempt {}/{}): {}. Retrying in {:?}",
                    provider,
                    attempt + 1,
                    policy.max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a transport error onto a provider error
pub(crate) fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

/// Map a non-success HTTP status onto a provider error
pub(crate) fn map_status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimitExceeded(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationError(body),
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message: body,
        },
    }
}

/// Fill the `{source_language}` and `{target_language}` placeholders
pub fn render_system_prompt(
    template: &str,
    request: &TranslationRequest,
) -> Result<String, TranslationError> {
    let source = language_utils::get_language_name(&request.source_language)
        .map_err(|_| TranslationError::UnsupportedLanguage(request.source_language.clone()))?;
    let target = language_utils::get_language_name(&request.target_language)
        .map_err(|_| TranslationError::UnsupportedLanguage(request.target_language.clone()))?;

    Ok(template
        .replace("{source_language}", &source)
        .replace("{target_language}", &target))
}

/// Build the configured translator
pub fn translator_from_config(config: &TranslationConfig) -> Arc<dyn Translator> {
    match config.provider {
        TranslationProvider::Ollama => Arc::new(Ollama::from_config(config)),
        TranslationProvider::Anthropic => Arc::new(Anthropic::from_config(config)),
        TranslationProvider::Mock => Arc::new(MockTranslator::working()),
    }
}
