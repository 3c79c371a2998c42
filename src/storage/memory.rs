/*!
 * In-memory object store.
 */

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use super::{ByteStream, ObjectMeta, ObjectStore, content_etag};
use crate::errors::StoreError;

/// Default chunk size for streamed reads
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    content: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// In-process object store.
///
/// Reads are streamed in `chunk_size` pieces so consumers see the same
/// chunked delivery as with a remote store.
#[derive(Debug)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create an empty store that streams reads in chunks of `chunk_size` bytes
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of objects in a bucket, zero if the bucket does not exist
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, BTreeMap::len)
    }

    fn meta(bucket: &str, key: &str, object: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: object.content.len() as u64,
            etag: object.etag.clone(),
            last_modified: object.last_modified,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.buckets.write().entry(bucket.to_string()).or_default();
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError> {
        let content = {
            let buckets = self.buckets.read();
            let objects = buckets
                .get(bucket)
                .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
            objects
                .get(key)
                .map(|object| object.content.clone())
                .ok_or_else(|| StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })?
        };

        let chunk_size = self.chunk_size;
        let chunks: Vec<Result<Bytes, StoreError>> = (0..content.len())
            .step_by(chunk_size)
            .map(|start| Ok(content.slice(start..(start + chunk_size).min(content.len()))))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }

    async fn put(&self, bucket: &str, key: &str, content: Bytes) -> Result<ObjectMeta, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_string(),
                reason: "key is empty".to_string(),
            });
        }

        let object = StoredObject {
            etag: content_etag(&content),
            content,
            last_modified: Utc::now(),
        };

        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        let meta = Self::meta(bucket, key, &object);
        objects.insert(key.to_string(), object);

        Ok(meta)
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;

        Ok(objects
            .iter()
            .map(|(key, object)| Self::meta(bucket, key, object))
            .collect())
    }
}
