/*!
 * Notification capability for finished translations.
 *
 * - `LogNotifier`: writes the notification to the log
 * - `OutboxNotifier`: drops one `.eml` message file per notification into a directory
 * - `RecordingNotifier`: keeps notifications in memory
 */

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::NotificationConfig;
use crate::errors::NotifyError;

/// Sender address used in outbox messages
pub const SENDER: &str = "translate-relay@localhost";

/// One message to a human recipient
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Notification announcing a stored translation; `text` is omitted when unavailable
    pub fn translation_complete(
        recipient: &str,
        bucket: &str,
        key: &str,
        text: Option<&str>,
    ) -> Self {
        let mut body = format!(
            "A translated document is ready.\n\nBucket: {}\nKey: {}\n",
            bucket, key
        );
        match text {
            Some(text) => {
                body.push_str("\n---\n");
                body.push_str(text);
                if !text.ends_with('\n') {
                    body.push('\n');
                }
            }
            None => body.push_str("\nThe translated text could not be attached.\n"),
        }

        Self::new(recipient, format!("Translation complete: {}", key), body)
    }
}

/// Reject recipients that cannot be addressed
pub fn validate_recipient(recipient: &str) -> Result<(), NotifyError> {
    let trimmed = recipient.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(NotifyError::InvalidRecipient(recipient.to_string())),
    }
}

/// Notification capability
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier that only logs
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        validate_recipient(&notification.recipient)?;
        info!(
            "📧 To {}: {} ({} bytes)",
            notification.recipient,
            notification.subject,
            notification.body.len()
        );
        Ok(())
    }
}

/// Notifier writing RFC 822 style message files into a directory
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn render(notification: &Notification, message_id: &str, date: DateTime<Utc>) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nMessage-ID: <{}@translate-relay>\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            SENDER,
            notification.recipient,
            notification.subject.replace(['\r', '\n'], " "),
            date.to_rfc2822(),
            message_id,
            notification.body
        )
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        validate_recipient(&notification.recipient)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| NotifyError::Delivery(format!("{}: {}", self.dir.display(), e)))?;

        let now = Utc::now();
        let message_id = uuid::Uuid::new_v4().to_string();
        let path = self
            .dir
            .join(format!("{}-{}.eml", now.format("%Y%m%dT%H%M%S%3f"), message_id));

        tokio::fs::write(&path, Self::render(notification, &message_id, now))
            .await
            .map_err(|e| NotifyError::Delivery(format!("{}: {}", path.display(), e)))?;

        info!("📧 Queued message for {} in {}", notification.recipient, path.display());
        Ok(())
    }
}

/// In-memory notifier; clones share one record
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier whose deliveries always fail
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Notifications delivered so far
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        validate_recipient(&notification.recipient)?;
        if self.failing {
            return Err(NotifyError::Delivery("simulated delivery failure".to_string()));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

/// Build the configured notifier: an outbox when a directory is set, logging otherwise
pub fn notifier_from_config(config: &NotificationConfig) -> Arc<dyn Notifier> {
    match &config.outbox_dir {
        Some(dir) if !dir.trim().is_empty() => Arc::new(OutboxNotifier::new(dir)),
        _ => Arc::new(LogNotifier),
    }
}
