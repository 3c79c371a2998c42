use anyhow::{Result, anyhow};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::language_utils;

/// Environment variable naming the bucket translated objects are written to
pub const ENV_RESULT_BUCKET: &str = "RESULT_BUCKET";
/// Environment variable naming the translation target language
pub const ENV_TARGET_LANGUAGE: &str = "TARGET_LANGUAGE";
/// Environment variable naming the completion notification recipient
pub const ENV_NOTIFY_RECIPIENT: &str = "NOTIFY_RECIPIENT";

/// Largest batch a queue consumer may request
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and applying environment overrides.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Bucket new documents are uploaded into
    #[serde(default = "default_source_bucket")]
    pub source_bucket: String,

    /// Bucket translated documents are written to
    #[serde(default = "default_result_bucket")]
    pub result_bucket: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Consumer settings for the translation stage queue
    #[serde(default = "default_translation_stage")]
    pub translation_queue: StageConfig,

    /// Consumer settings for the completion stage queue
    #[serde(default = "default_completion_stage")]
    pub completion_queue: StageConfig,

    /// What happens to units that fail
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Units processed concurrently within one batch
    #[serde(default = "default_max_concurrent_units")]
    pub max_concurrent_units: usize,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Completion notification config
    #[serde(default)]
    pub notification: NotificationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Handling of units that fail processing
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    // @policy: Log and absorb the failure
    #[default]
    Drop,
    // @policy: Hand the failed unit to the stage's dead-letter queue
    DeadLetter,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "drop" => Ok(Self::Drop),
            "dead_letter" => Ok(Self::DeadLetter),
            _ => Err(anyhow!("Invalid failure policy: {}", s)),
        }
    }
}

/// Queue and consumer settings for one pipeline stage
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StageConfig {
    // @field: Max messages per worker invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    // @field: Max seconds spent filling a batch after its first message
    #[serde(default = "default_max_batching_window_secs")]
    pub max_batching_window_secs: u64,

    // @field: Long-poll wait per receive call
    #[serde(default = "default_receive_wait_time_secs")]
    pub receive_wait_time_secs: u64,

    // @field: Seconds a received message stays invisible
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,

    // @field: Time budget of one worker invocation
    #[serde(default = "default_translation_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,

    // @field: Receives before a message is moved to the dead-letter queue
    #[serde(default)]
    pub max_receive_count: Option<u32>,
}

impl StageConfig {
    pub fn batching_window(&self) -> Duration {
        Duration::from_secs(self.max_batching_window_secs)
    }

    pub fn receive_wait_time(&self) -> Duration {
        Duration::from_secs(self.receive_wait_time_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    /// Check the settings of the stage called `name`
    pub fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid {
                name,
                reason: format!(
                    "batch_size must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, self.batch_size
                ),
            });
        }
        if self.visibility_timeout_secs == 0 || self.invocation_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name,
                reason: "visibility and invocation timeouts must be non-zero".to_string(),
            });
        }
        // A batch must be fully handled before its first message reappears
        let needed = self.max_batching_window_secs + self.invocation_timeout_secs;
        if self.visibility_timeout_secs < needed {
            return Err(ConfigError::Invalid {
                name,
                reason: format!(
                    "visibility_timeout_secs ({}) must be at least the batching window plus the invocation timeout ({})",
                    self.visibility_timeout_secs, needed
                ),
            });
        }
        if self.max_receive_count == Some(0) {
            return Err(ConfigError::Invalid {
                name,
                reason: "max_receive_count must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: Ollama
    #[default]
    Ollama,
    // @provider: Anthropic
    Anthropic,
    // @provider: Deterministic offline translator
    Mock,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::Anthropic => "Anthropic",
            Self::Mock => "Mock",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::Mock => "mock".to_string(),
        }
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            "mock" => Ok(Self::Mock),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint(provider_type),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// System prompt template for translation
    /// Placeholders: {source_language}, {target_language}
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Retry count for transient provider failures; redelivery retries otherwise
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Completion notification settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Address notified when a translation is stored
    #[serde(default = "default_recipient")]
    pub recipient: String,

    /// Directory receiving one `.eml` file per notification; logs only when unset
    #[serde(default)]
    pub outbox_dir: Option<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            recipient: default_recipient(),
            outbox_dir: None,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

/// Settings a translation worker needs at startup
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationWorkerSettings {
    pub destination_bucket: String,
    pub target_language: String,
}

impl TranslationWorkerSettings {
    pub fn new(
        destination_bucket: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let destination_bucket = destination_bucket.into();
        let target_language = target_language.into();
        if destination_bucket.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_RESULT_BUCKET));
        }
        if target_language.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_TARGET_LANGUAGE));
        }
        if language_utils::is_auto_detect(&target_language)
            || language_utils::validate_language_code(&target_language).is_err()
        {
            return Err(ConfigError::Invalid {
                name: ENV_TARGET_LANGUAGE,
                reason: format!("'{}' is not an ISO 639 language code", target_language),
            });
        }
        Ok(Self {
            destination_bucket,
            target_language,
        })
    }

    /// Read the settings through `lookup`, which maps variable names to values
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bucket = required(&lookup, ENV_RESULT_BUCKET)?;
        let language = required(&lookup, ENV_TARGET_LANGUAGE)?;
        Self::new(bucket, language)
    }
}

/// Settings a completion worker needs at startup
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionWorkerSettings {
    pub recipient: String,
}

impl CompletionWorkerSettings {
    pub fn new(recipient: impl Into<String>) -> Result<Self, ConfigError> {
        let recipient = recipient.into();
        if recipient.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_NOTIFY_RECIPIENT));
        }
        if !recipient.contains('@') {
            return Err(ConfigError::Invalid {
                name: ENV_NOTIFY_RECIPIENT,
                reason: format!("'{}' is not an email address", recipient),
            });
        }
        Ok(Self { recipient })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::new(required(&lookup, ENV_NOTIFY_RECIPIENT)?)
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn default_source_bucket() -> String {
    "translation-source".to_string()
}

fn default_result_bucket() -> String {
    "translation-result".to_string()
}

fn default_target_language() -> String {
    "ga".to_string()
}

fn default_batch_size() -> usize {
    5
}

fn default_max_batching_window_secs() -> u64 {
    10
}

fn default_receive_wait_time_secs() -> u64 {
    10
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_translation_invocation_timeout_secs() -> u64 {
    15
}

fn default_completion_invocation_timeout_secs() -> u64 {
    3
}

fn default_translation_stage() -> StageConfig {
    StageConfig {
        batch_size: default_batch_size(),
        max_batching_window_secs: default_max_batching_window_secs(),
        receive_wait_time_secs: default_receive_wait_time_secs(),
        visibility_timeout_secs: default_visibility_timeout_secs(),
        invocation_timeout_secs: default_translation_invocation_timeout_secs(),
        max_receive_count: None,
    }
}

fn default_completion_stage() -> StageConfig {
    StageConfig {
        invocation_timeout_secs: default_completion_invocation_timeout_secs(),
        ..default_translation_stage()
    }
}

impl Default for StageConfig {
    fn default() -> Self {
        default_translation_stage()
    }
}

fn default_max_concurrent_units() -> usize {
    1
}

fn default_recipient() -> String {
    "translations@example.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_count() -> u32 {
    0
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_endpoint(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Ollama => "http://localhost:11434".to_string(),
        TranslationProvider::Anthropic => "https://api.anthropic.com".to_string(),
        TranslationProvider::Mock => String::new(),
    }
}

fn default_model(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::Ollama => "llama3".to_string(),
        TranslationProvider::Anthropic => "claude-3-haiku-20240307".to_string(),
        TranslationProvider::Mock => "mock".to_string(),
    }
}

pub fn default_system_prompt() -> String {
    "You are a professional translator. Translate the following text from {source_language} to {target_language}. Preserve formatting and maintain the original meaning and tone. Reply with the translation only.".to_string()
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_bucket.trim().is_empty() {
            return Err(ConfigError::Missing("source_bucket"));
        }
        if self.source_bucket == self.result_bucket {
            // Results written into the source bucket would be translated again
            return Err(ConfigError::Invalid {
                name: "result_bucket",
                reason: "must differ from source_bucket".to_string(),
            });
        }

        self.translation_worker_settings()?;
        self.completion_worker_settings()?;
        self.translation_queue.validate("translation_queue")?;
        self.completion_queue.validate("completion_queue")?;

        if self.max_concurrent_units == 0 {
            return Err(ConfigError::Invalid {
                name: "max_concurrent_units",
                reason: "must be at least 1".to_string(),
            });
        }

        if self.translation.provider == TranslationProvider::Anthropic
            && self.translation.get_api_key().is_empty()
        {
            return Err(ConfigError::Missing("translation API key for Anthropic provider"));
        }

        // A provider still retrying when the invocation budget runs out takes
        // the whole batch down with it
        let budget_ms = self.translation_queue.invocation_timeout_secs.saturating_mul(1000);
        let worst_case_ms = self.translation.worst_case_request_ms();
        if self.translation.provider != TranslationProvider::Mock && worst_case_ms > budget_ms {
            return Err(ConfigError::Invalid {
                name: "translation",
                reason: format!(
                    "provider timeout_secs ({}) with {} retries may take {}ms, more than the translation invocation timeout ({}ms)",
                    self.translation.get_timeout_secs(),
                    self.translation.common.retry_count,
                    worst_case_ms,
                    budget_ms
                ),
            });
        }

        Ok(())
    }

    /// Override file values with worker environment variables found through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bucket) = lookup(ENV_RESULT_BUCKET).filter(|v| !v.trim().is_empty()) {
            self.result_bucket = bucket;
        }
        if let Some(language) = lookup(ENV_TARGET_LANGUAGE).filter(|v| !v.trim().is_empty()) {
            self.target_language = language;
        }
        if let Some(recipient) = lookup(ENV_NOTIFY_RECIPIENT).filter(|v| !v.trim().is_empty()) {
            self.notification.recipient = recipient;
        }
    }

    pub fn translation_worker_settings(&self) -> Result<TranslationWorkerSettings, ConfigError> {
        TranslationWorkerSettings::new(&self.result_bucket, &self.target_language)
    }

    pub fn completion_worker_settings(&self) -> Result<CompletionWorkerSettings, ConfigError> {
        CompletionWorkerSettings::new(&self.notification.recipient)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_bucket: default_source_bucket(),
            result_bucket: default_result_bucket(),
            target_language: default_target_language(),
            translation_queue: default_translation_stage(),
            completion_queue: default_completion_stage(),
            failure_policy: FailurePolicy::default(),
            max_concurrent_units: default_max_concurrent_units(),
            translation: TranslationConfig::default(),
            notification: NotificationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        let provider_str = self.provider.to_lowercase_string();
        self.available_providers
            .iter()
            .find(|p| p.provider_type == provider_str)
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        match self.get_active_provider_config() {
            Some(provider_config) if !provider_config.model.is_empty() => {
                provider_config.model.clone()
            }
            _ => default_model(self.provider),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        match self.get_active_provider_config() {
            Some(provider_config) if !provider_config.endpoint.is_empty() => {
                provider_config.endpoint.clone()
            }
            _ => default_endpoint(self.provider),
        }
    }

    /// Longest one translation request may take with every retry and backoff spent
    pub fn worst_case_request_ms(&self) -> u64 {
        let attempts = u64::from(self.common.retry_count) + 1;
        let requests = self
            .get_timeout_secs()
            .saturating_mul(1000)
            .saturating_mul(attempts);
        // Backoff doubles per retry and carries up to 50% jitter
        let backoff = (0..self.common.retry_count).fold(0u64, |total, attempt| {
            let base = self
                .common
                .retry_backoff_ms
                .saturating_mul(1u64 << attempt.min(16));
            total.saturating_add(base.saturating_add(base / 2))
        });
        requests.saturating_add(backoff)
    }

    /// Get the request timeout for the active provider
    pub fn get_timeout_secs(&self) -> u64 {
        match self.get_active_provider_config() {
            Some(provider_config) if provider_config.timeout_secs > 0 => {
                provider_config.timeout_secs
            }
            _ => default_timeout_secs(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::Anthropic),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
