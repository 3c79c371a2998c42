/*!
 * Directory-backed object store.
 *
 * Writes go to a temporary file renamed into place, so readers never see
 * partial objects.
 */

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::debug;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use super::{ByteStream, ObjectMeta, ObjectStore, content_etag};
use crate::errors::StoreError;

/// Chunk size for streamed file reads
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Suffix of in-progress writes; never listed or read as objects
const PARTIAL_SUFFIX: &str = ".partial";

/// Directory-backed object store.
///
/// Each bucket is a sub-directory of `root`; keys map onto relative paths, so
/// `docs/a.txt` lives at `<root>/<bucket>/docs/a.txt`. Writes go to a
/// temporary sibling file that is renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `root`; the directory is created on first use
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StoreError::NoSuchBucket(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    async fn existing_bucket_dir(&self, bucket: &str) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir(bucket)?;
        if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            Ok(dir)
        } else {
            Err(StoreError::NoSuchBucket(bucket.to_string()))
        }
    }

    /// Map a key onto a path inside the bucket directory
    fn object_path(bucket_dir: &Path, key: &str) -> Result<PathBuf, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key.starts_with('/') || key.contains('\\') {
            return Err(invalid("key must be a relative path"));
        }
        if key.ends_with(PARTIAL_SUFFIX) {
            return Err(invalid("key uses a reserved suffix"));
        }

        let mut path = bucket_dir.to_path_buf();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid("key has an empty or relative segment"));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn meta_from_file(bucket: &str, key: String, path: &Path) -> Result<ObjectMeta, StoreError> {
        let content = std::fs::read(path)?;
        let modified = std::fs::metadata(path)?.modified()?;

        Ok(ObjectMeta {
            bucket: bucket.to_string(),
            key,
            size: content.len() as u64,
            etag: content_etag(&content),
            last_modified: DateTime::<Utc>::from(modified),
        })
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let dir = self.bucket_dir(bucket)?;
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Bucket '{}' ready at {:?}", bucket, dir);
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError> {
        let dir = self.existing_bucket_dir(bucket).await?;
        let path = Self::object_path(&dir, key)?;

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let chunks = stream::try_unfold(file, |mut file| async move {
            let mut buffer = vec![0u8; READ_CHUNK_SIZE];
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                return Ok(None);
            }
            buffer.truncate(read);
            Ok::<_, StoreError>(Some((Bytes::from(buffer), file)))
        });

        Ok(chunks.boxed())
    }

    async fn put(&self, bucket: &str, key: &str, content: Bytes) -> Result<ObjectMeta, StoreError> {
        let dir = self.existing_bucket_dir(bucket).await?;
        let path = Self::object_path(&dir, key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Write(format!("{}: {}", parent.display(), e)))?;
        }

        let mut partial = path.clone().into_os_string();
        partial.push(format!(".{}{}", uuid::Uuid::new_v4().simple(), PARTIAL_SUFFIX));
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &content)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", partial.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(StoreError::Write(format!("{}: {}", path.display(), e)));
        }

        Ok(ObjectMeta {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: content.len() as u64,
            etag: content_etag(&content),
            last_modified: Utc::now(),
        })
    }

    async fn list(&self, bucket: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let dir = self.existing_bucket_dir(bucket).await?;
        let bucket = bucket.to_string();

        let listing = tokio::task::spawn_blocking(move || -> Result<Vec<ObjectMeta>, StoreError> {
            let mut objects = Vec::new();
            for entry in WalkDir::new(&dir).sort_by_file_name() {
                let entry = entry.map_err(|e| StoreError::Read(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                if path.to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&dir) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                objects.push(Self::meta_from_file(&bucket, key, path)?);
            }
            objects.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(objects)
        })
        .await
        .map_err(|e| StoreError::Read(format!("listing task failed: {}", e)))?;

        listing
    }
}
