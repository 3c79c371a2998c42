/*!
 * Object store capability and implementations.
 *
 * - `memory`: in-process store, used by tests and dry runs
 * - `filesystem`: directory-backed store, one sub-directory per bucket
 * - `notifying`: wrapper that publishes change events after writes
 */

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, TryStreamExt};
use sha2::{Digest, Sha256};
use std::fmt::Debug;

use crate::errors::StoreError;

pub mod filesystem;
pub mod memory;
pub mod notifying;

pub use self::filesystem::FsStore;
pub use self::memory::MemoryStore;
pub use self::notifying::NotifyingStore;

/// Object content as a stream of chunks.
///
/// Chunk boundaries carry no meaning and may split multibyte characters.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    /// Hex SHA-256 of the content
    pub etag: String,
    pub last_modified: DateTime<Utc>,
}

/// Durable key/value blob storage.
///
/// `put` overwrites; concurrent writers to one key resolve last-writer-wins.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Create a bucket; creating an existing bucket is a no-op
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Open an object for streaming reads
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError>;

    /// Store an object, replacing any previous content under the key
    async fn put(&self, bucket: &str, key: &str, content: Bytes) -> Result<ObjectMeta, StoreError>;

    /// List a bucket's objects ordered by key
    async fn list(&self, bucket: &str) -> Result<Vec<ObjectMeta>, StoreError>;
}

/// Drain a byte stream into one buffer
pub async fn collect_bytes(stream: ByteStream) -> Result<Vec<u8>, StoreError> {
    stream
        .try_fold(Vec::new(), |mut buffer, chunk| async move {
            buffer.extend_from_slice(&chunk);
            Ok(buffer)
        })
        .await
}

/// Content hash used as the object etag
pub fn content_etag(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}
