use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    RetryPolicy, TranslationRequest, Translator, map_status_error, map_transport_error,
    render_system_prompt, shared_http_client, with_retry,
};
use crate::app_config::TranslationConfig;
use crate::errors::{ProviderError, TranslationError};

/// Ollama client for translating through a local Ollama server
#[derive(Debug, Clone)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// Model name
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Per-request timeout
    timeout: Duration,
    /// System prompt template
    system_prompt: String,
    temperature: f32,
    retry: RetryPolicy,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: String,
    stream: bool,
    options: GenerationOptions,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize)]
struct GenerationOptions {
    temperature: f32,
}

/// Generation response from the Ollama API
#[derive(Debug, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    pub done: bool,
    /// Number of prompt tokens
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(default)]
    pub eval_count: Option<u64>,
}

impl Ollama {
    /// Create a new Ollama client for a base URL such as `http://localhost:11434`
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: shared_http_client(),
            timeout: Duration::from_secs(120),
            system_prompt: crate::app_config::default_system_prompt(),
            temperature: 0.3,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a client from the active provider settings
    pub fn from_config(config: &TranslationConfig) -> Self {
        let mut client = Self::new(config.get_endpoint(), config.get_model());
        client.timeout = Duration::from_secs(config.get_timeout_secs());
        client.system_prompt = config.common.system_prompt.clone();
        client.temperature = config.common.temperature;
        client.retry = RetryPolicy {
            max_retries: config.common.retry_count,
            backoff_base_ms: config.common.retry_backoff_ms,
        };
        client
    }

    /// Endpoint the client posts to
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    async fn generate_once(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<GenerationResponse, ProviderError> {
        let response = self
            .client
            .post(self.generate_url())
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, body));
        }

        response
            .json::<GenerationResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl Translator for Ollama {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        let generation = GenerationRequest {
            model: &self.model,
            prompt: &request.text,
            system: render_system_prompt(&self.system_prompt, request)?,
            stream: false,
            options: GenerationOptions {
                temperature: self.temperature,
            },
        };

        let response = with_retry(self.name(), self.retry, || self.generate_once(&generation)).await?;
        debug!(
            "Ollama model {} produced {} token(s)",
            response.model,
            response.eval_count.unwrap_or_default()
        );

        Ok(response.response.trim().to_string())
    }
}
