/*!
 * Object store wrapper publishing change events to topics.
 */

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::{ByteStream, ObjectMeta, ObjectStore};
use crate::errors::StoreError;
use crate::event::ChangeEvent;
use crate::messaging::Topic;

/// Subject attached to published change notifications
pub const OBJECT_CREATED_SUBJECT: &str = "ObjectCreated";

/// Store wrapper emitting "object created" notifications.
///
/// After a successful write into a bucket with subscriptions, the change
/// event is published to each subscribed topic. The write and the publish
/// are not atomic: a failed publish is logged and the write stands.
#[derive(Debug)]
pub struct NotifyingStore<S> {
    inner: S,
    subscriptions: RwLock<HashMap<String, Vec<Arc<Topic>>>>,
}

impl<S: ObjectStore> NotifyingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Publish "object created" events for `bucket` to `topic`
    pub fn on_object_created(&self, bucket: &str, topic: Arc<Topic>) {
        debug!("Bucket '{}' notifies topic '{}' on object creation", bucket, topic.name());
        self.subscriptions
            .write()
            .entry(bucket.to_string())
            .or_default()
            .push(topic);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn notify_created(&self, meta: &ObjectMeta) {
        let topics = match self.subscriptions.read().get(&meta.bucket) {
            Some(topics) => topics.clone(),
            None => return,
        };

        let event = ChangeEvent {
            bucket: meta.bucket.clone(),
            key: meta.key.clone(),
            event_time: meta.last_modified,
            size: meta.size,
            etag: meta.etag.clone(),
        };
        let payload = match event.to_store_event_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode change event for {}/{}: {}", meta.bucket, meta.key, e);
                return;
            }
        };

        for topic in topics {
            match topic.publish(Some(OBJECT_CREATED_SUBJECT), &payload) {
                Ok(message_id) => debug!(
                    "Published creation of {}/{} to '{}' as {}",
                    meta.bucket,
                    meta.key,
                    topic.name(),
                    message_id
                ),
                Err(e) => error!(
                    "Failed to publish creation of {}/{} to '{}': {}",
                    meta.bucket,
                    meta.key,
                    topic.name(),
                    e
                ),
            }
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for NotifyingStore<S> {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.inner.create_bucket(bucket).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError> {
        self.inner.get(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, content: Bytes) -> Result<ObjectMeta, StoreError> {
        let meta = self.inner.put(bucket, key, content).await?;
        self.notify_created(&meta);
        Ok(meta)
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        self.inner.list(bucket).await
    }
}
