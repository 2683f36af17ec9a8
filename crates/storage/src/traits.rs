//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::path::Path;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Location of an object: a bucket plus a key within it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectInBucket {
    pub bucket: String,
    pub key: String,
}

impl ObjectInBucket {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// `s3://bucket/key` form, understood by external renderers.
    pub fn s3_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Debug for ObjectInBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectInBucket({}/{})", self.bucket, self.key)
    }
}

impl fmt::Display for ObjectInBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Metadata about a stored object.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<time::OffsetDateTime>,
    /// Content type (if available).
    pub content_type: Option<String>,
}

/// Bucketed blob storage holding originals, thumbnails and projections.
///
/// Reads of absent objects return `Ok(None)`; only genuine backend failures
/// are errors.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Get an object's metadata without fetching content.
    async fn head(&self, object: &ObjectInBucket) -> StorageResult<Option<ObjectMeta>>;

    /// Get an object's content.
    async fn get(&self, object: &ObjectInBucket) -> StorageResult<Option<Bytes>>;

    /// Get an object as a byte stream.
    async fn get_stream(&self, object: &ObjectInBucket) -> StorageResult<Option<ByteStream>>;

    /// Put an object atomically.
    async fn put(&self, object: &ObjectInBucket, data: Bytes, content_type: &str)
    -> StorageResult<()>;

    /// Upload a local file, returning the number of bytes stored.
    async fn put_file(
        &self,
        object: &ObjectInBucket,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<u64>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, object: &ObjectInBucket) -> StorageResult<()>;

    /// Static identifier for the backend type (e.g., "s3", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// Verify the backend can reach `bucket`.
    async fn health_check(&self, _bucket: &str) -> StorageResult<()> {
        Ok(())
    }
}
