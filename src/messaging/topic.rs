/*!
 * Fan-out topic delivering published messages to subscribed queues.
 */

use chrono::Utc;
use log::{debug, error};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use super::queue::WorkQueue;
use crate::errors::MessagingError;
use crate::event::envelope::{NOTIFICATION_TYPE, TopicEnvelope};

/// Fan-out notification topic.
///
/// Every published message is wrapped in a topic envelope and delivered to
/// each subscribed queue independently.
#[derive(Debug)]
pub struct Topic {
    name: String,
    display_name: String,
    subscribers: RwLock<Vec<Arc<WorkQueue>>>,
}

impl Topic {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Subscribe a queue; it receives every message published from now on
    pub fn subscribe(&self, queue: Arc<WorkQueue>) {
        debug!("Queue '{}' subscribed to topic '{}'", queue.name(), self.name);
        self.subscribers.write().push(queue);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publish a message to all subscribers, returning the envelope's message id.
    ///
    /// Delivery is attempted for every subscriber even if one fails; the first
    /// failure is reported afterwards.
    pub fn publish(&self, subject: Option<&str>, message: &str) -> Result<String, MessagingError> {
        let message_id = Uuid::new_v4().to_string();
        let envelope = TopicEnvelope {
            kind: Some(NOTIFICATION_TYPE.to_string()),
            message_id: Some(message_id.clone()),
            topic: Some(self.name.clone()),
            subject: subject.map(str::to_string),
            message: Some(message.to_string()),
            timestamp: Some(Utc::now()),
        };
        let body = serde_json::to_string(&envelope)?;

        let subscribers = self.subscribers.read().clone();
        let mut first_error = None;
        for queue in subscribers {
            if let Err(e) = queue.send(body.clone()) {
                error!("Topic '{}' failed to deliver to '{}': {}", self.name, queue.name(), e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(message_id),
        }
    }
}
