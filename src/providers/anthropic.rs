use async_trait::async_trait;
use log::debug;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{
    RetryPolicy, TranslationRequest, Translator, map_status_error, map_transport_error,
    render_system_prompt, shared_http_client, with_retry,
};
use crate::app_config::TranslationConfig;
use crate::errors::{ProviderError, TranslationError};

/// Public API endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

/// Anthropic client for interacting with the messages API
#[derive(Debug, Clone)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL
    endpoint: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
    temperature: f32,
    retry: RetryPolicy,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// System prompt to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Token usage information
    pub usage: TokenUsage,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// Text content, absent for non-text blocks
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            system: None,
            temperature: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Anthropic {
    /// Create a new Anthropic client
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: shared_http_client(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
            system_prompt: crate::app_config::default_system_prompt(),
            temperature: 0.3,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a client from the active provider settings
    pub fn from_config(config: &TranslationConfig) -> Self {
        let mut client = Self::new(config.get_api_key(), config.get_endpoint(), config.get_model());
        client.timeout = Duration::from_secs(config.get_timeout_secs());
        client.system_prompt = config.common.system_prompt.clone();
        client.temperature = config.common.temperature;
        client.retry = RetryPolicy {
            max_retries: config.common.retry_count,
            backoff_base_ms: config.common.retry_backoff_ms,
        };
        client
    }

    /// Messages endpoint, falling back to the public API
    pub fn messages_url(&self) -> Result<Url, ProviderError> {
        let base = if self.endpoint.trim().is_empty() {
            DEFAULT_ENDPOINT
        } else {
            self.endpoint.trim()
        };
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid endpoint '{}': {}", base, e)))?;
        base.join("v1/messages")
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))
    }

    /// Complete a messages request
    pub async fn complete(&self, request: &AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let response = self
            .client
            .post(self.messages_url()?)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }

    /// Extract text from an Anthropic response
    pub fn extract_text_from_response(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[async_trait]
impl Translator for Anthropic {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        let api_request = AnthropicRequest::new(&self.model, self.max_tokens)
            .system(render_system_prompt(&self.system_prompt, request)?)
            .temperature(self.temperature)
            .add_message("user", &request.text);

        let response = with_retry(self.name(), self.retry, || self.complete(&api_request)).await?;
        debug!(
            "Anthropic usage: {} input / {} output tokens",
            response.usage.input_tokens, response.usage.output_tokens
        );

        Ok(Self::extract_text_from_response(&response).trim().to_string())
    }
}
