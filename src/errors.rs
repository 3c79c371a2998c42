/*!
 * Error types for the translate-relay pipeline.
 *
 * Each stage of the pipeline owns an error type so that failures can be
 * scoped precisely: a `DecodeError` belongs to one queue message, a
 * `UnitError` to one work unit, and a `WorkerError` to a whole invocation.
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) | Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::ParseError(_) | Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The requested language is not a known ISO 639 code
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

/// Errors raised by object store implementations
#[derive(Error, Debug)]
pub enum StoreError {
    /// No object under the given key
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The bucket does not exist
    #[error("No such bucket: {0}")]
    NoSuchBucket(String),

    /// The key cannot be mapped onto the store
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// Reading object content failed part way
    #[error("Failed to read object: {0}")]
    Read(String),

    /// Writing object content failed
    #[error("Failed to write object: {0}")]
    Write(String),

    /// Underlying filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors decoding a queue message into work units
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The queue message body is not a valid topic envelope
    #[error("Malformed topic envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    /// The topic message is not valid JSON or has malformed change records
    #[error("Malformed change payload: {0}")]
    Payload(#[source] serde_json::Error),

    /// An object key could not be decoded
    #[error("Undecodable object key '{key}': {reason}")]
    Key { key: String, reason: String },
}

/// Errors from the notification capability
#[derive(Error, Debug)]
pub enum NotifyError {
    /// The recipient address is not usable
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// The notification could not be delivered
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Errors publishing to topics or sending to queues
#[derive(Error, Debug)]
pub enum MessagingError {
    /// The destination no longer accepts messages
    #[error("Queue '{0}' is closed")]
    Closed(String),

    /// The message could not be serialized
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure of one work unit; absorbed by the batch worker
#[derive(Error, Debug)]
pub enum UnitError {
    /// Fetching the source object failed
    #[error("Fetch failed: {0}")]
    Fetch(#[source] StoreError),

    /// Source object content is not valid UTF-8 text
    #[error("Source object is not UTF-8 text: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// The translation capability failed
    #[error("Translation failed: {0}")]
    Translate(#[from] TranslationError),

    /// Writing the result object failed
    #[error("Write failed: {0}")]
    Write(#[source] StoreError),

    /// Sending the notification failed
    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// Failure of a whole worker invocation; the batch becomes eligible for redelivery
#[derive(Error, Debug)]
pub enum WorkerError {
    /// A dead-letter record could not be handed off
    #[error("Dead-letter hand-off failed: {0}")]
    DeadLetter(#[source] MessagingError),

    /// The invocation exceeded its time budget
    #[error("Invocation exceeded its {budget_ms} ms time budget")]
    TimedOut { budget_ms: u64 },
}

/// Configuration errors, fatal for the worker instance that hits them
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is absent or empty
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting has an unusable value
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from an object store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from messaging
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
