/*!
 * At-least-once work queue with visibility-timeout redelivery.
 *
 * A received message is hidden from other consumers until its visibility
 * timeout expires. A consumer acknowledges by deleting the message with the
 * receipt handle it got; a message that is not deleted in time becomes
 * visible again with an incremented receive count. With a redrive policy, a
 * message that has been received `max_receive_count` times without being
 * deleted moves to the dead-letter queue instead.
 */

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::MessagingError;

/// Queue behaviour settings
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// How long a received message stays hidden
    pub visibility_timeout: Duration,
    /// Receives allowed before a message is moved to the dead-letter queue
    pub max_receive_count: Option<u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: None,
        }
    }
}

/// A message handed to a consumer
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Stable id across redeliveries
    pub message_id: String,
    /// Handle for this delivery only; needed to delete the message
    pub receipt_handle: String,
    pub body: String,
    /// How many times the message has been received, this delivery included
    pub receive_count: u32,
    pub sent_at: DateTime<Utc>,
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages available for receipt
    pub visible: usize,
    /// Messages received and not yet deleted
    pub in_flight: usize,
    pub sent: u64,
    pub deleted: u64,
    pub dead_lettered: u64,
}

impl QueueStats {
    /// Whether nothing is waiting or being processed
    pub fn is_drained(&self) -> bool {
        self.visible == 0 && self.in_flight == 0
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    receive_count: u32,
    sent_at: DateTime<Utc>,
}

#[derive(Debug)]
struct InFlight {
    message: StoredMessage,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<StoredMessage>,
    in_flight: HashMap<String, InFlight>,
    closed: bool,
    sent: u64,
    deleted: u64,
    dead_lettered: u64,
}

/// Durable-in-process work queue
#[derive(Debug)]
pub struct WorkQueue {
    name: String,
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
    dead_letter: Option<Arc<WorkQueue>>,
}

impl WorkQueue {
    /// Create a queue
    pub fn new(name: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            dead_letter: None,
        }
    }

    /// Attach a dead-letter queue used once `max_receive_count` is exceeded
    pub fn with_dead_letter_queue(mut self, dead_letter: Arc<WorkQueue>) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a message body, returning its message id
    pub fn send(&self, body: impl Into<String>) -> Result<String, MessagingError> {
        let id = Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(MessagingError::Closed(self.name.clone()));
            }
            state.visible.push_back(StoredMessage {
                id: id.clone(),
                body: body.into(),
                receive_count: 0,
                sent_at: Utc::now(),
            });
            state.sent += 1;
        }
        self.notify.notify_waiters();
        debug!("Queue '{}' accepted message {}", self.name, id);
        Ok(id)
    }

    /// Receive up to `max_messages`, long-polling for at most `wait`.
    ///
    /// Returns as soon as at least one message is available; an empty result
    /// means the wait elapsed or the queue was closed.
    pub async fn receive(&self, max_messages: usize, wait: Duration) -> Vec<QueueMessage> {
        let deadline = Instant::now() + wait;

        loop {
            // Registered before inspecting state so a concurrent send is not missed
            let notified = self.notify.notified();

            let (messages, next_expiry, expired_to_dead_letter, closed) = {
                let mut state = self.state.lock();
                let now = Instant::now();
                let dead = self.reclaim_expired(&mut state, now);
                let messages = self.take_visible(&mut state, max_messages, now);
                let next_expiry = state.in_flight.values().map(|f| f.visible_at).min();
                (messages, next_expiry, dead, state.closed)
            };

            self.forward_to_dead_letter(expired_to_dead_letter);

            if !messages.is_empty() || closed {
                return messages;
            }

            let now = Instant::now();
            if now >= deadline {
                return messages;
            }

            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Delete a received message; `false` if the receipt is stale or unknown
    pub fn delete(&self, receipt_handle: &str) -> bool {
        let mut state = self.state.lock();
        match state.in_flight.remove(receipt_handle) {
            Some(_) => {
                state.deleted += 1;
                true
            }
            None => false,
        }
    }

    /// Change how long a received message stays hidden, counted from now
    pub fn change_visibility(&self, receipt_handle: &str, timeout: Duration) -> bool {
        let changed = {
            let mut state = self.state.lock();
            match state.in_flight.get_mut(receipt_handle) {
                Some(in_flight) => {
                    in_flight.visible_at = Instant::now() + timeout;
                    true
                }
                None => false,
            }
        };
        if changed && timeout.is_zero() {
            self.notify.notify_waiters();
        }
        changed
    }

    /// Stop accepting messages and wake all waiting receivers
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            visible: state.visible.len(),
            in_flight: state.in_flight.len(),
            sent: state.sent,
            deleted: state.deleted,
            dead_lettered: state.dead_lettered,
        }
    }

    /// Move expired in-flight messages back to the front of the queue.
    ///
    /// Messages over the receive limit are removed and returned for the
    /// dead-letter queue instead.
    fn reclaim_expired(&self, state: &mut QueueState, now: Instant) -> Vec<StoredMessage> {
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        if expired.is_empty() {
            return Vec::new();
        }

        let mut reclaimed: Vec<StoredMessage> = expired
            .iter()
            .filter_map(|receipt| state.in_flight.remove(receipt))
            .map(|f| f.message)
            .collect();
        reclaimed.sort_by_key(|m| m.sent_at);

        let mut dead = Vec::new();
        // oldest ends up first
        for message in reclaimed.into_iter().rev() {
            let over_limit = self
                .config
                .max_receive_count
                .is_some_and(|limit| message.receive_count >= limit);

            if over_limit && self.dead_letter.is_some() {
                state.dead_lettered += 1;
                dead.push(message);
            } else {
                debug!(
                    "Message {} on '{}' visible again after {} receive(s)",
                    message.id, self.name, message.receive_count
                );
                state.visible.push_front(message);
            }
        }
        dead
    }

    fn take_visible(&self, state: &mut QueueState, max_messages: usize, now: Instant) -> Vec<QueueMessage> {
        let count = max_messages.min(state.visible.len());
        let mut messages = Vec::with_capacity(count);

        for mut message in state.visible.drain(..count).collect::<Vec<_>>() {
            message.receive_count += 1;
            let receipt_handle = Uuid::new_v4().to_string();
            messages.push(QueueMessage {
                message_id: message.id.clone(),
                receipt_handle: receipt_handle.clone(),
                body: message.body.clone(),
                receive_count: message.receive_count,
                sent_at: message.sent_at,
            });
            state.in_flight.insert(
                receipt_handle,
                InFlight {
                    message,
                    visible_at: now + self.config.visibility_timeout,
                },
            );
        }
        messages
    }

    fn forward_to_dead_letter(&self, messages: Vec<StoredMessage>) {
        let Some(dead_letter) = &self.dead_letter else {
            return;
        };
        for message in messages {
            warn!(
                "Message {} on '{}' exceeded {} receive(s), moving to '{}'",
                message.id,
                self.name,
                message.receive_count,
                dead_letter.name()
            );
            if let Err(e) = dead_letter.send(message.body) {
                error!("Failed to move message {} to dead-letter queue: {}", message.id, e);
            }
        }
    }
}
