//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tessera_storage::{
    BlobStore, ByteStream, FilesystemBackend, ObjectInBucket, ObjectMeta, StorageError,
    StorageResult,
};

/// Filesystem blob store that counts content reads and writes.
///
/// An optional read delay widens the window in which concurrent callers
/// race for the same object.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct CountingBlobStore {
    inner: FilesystemBackend,
    reads: AtomicUsize,
    writes: AtomicUsize,
    read_delay: Duration,
    failing_keys: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl CountingBlobStore {
    pub async fn new(root: &Path) -> Arc<Self> {
        Self::with_read_delay(root, Duration::ZERO).await
    }

    pub async fn with_read_delay(root: &Path, read_delay: Duration) -> Arc<Self> {
        let inner = FilesystemBackend::new(root)
            .await
            .expect("Failed to create storage backend");
        Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            read_delay,
            failing_keys: Mutex::new(HashSet::new()),
        })
    }

    /// Number of `get`/`get_stream` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `put`/`put_file` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store an object without counting it as a write.
    pub async fn seed(&self, bucket: &str, key: &str, data: &'static [u8]) {
        self.inner
            .put(
                &ObjectInBucket::new(bucket, key),
                Bytes::from_static(data),
                "application/octet-stream",
            )
            .await
            .expect("Failed to seed object");
    }

    /// Make every later read of `key` fail with an I/O error.
    pub fn fail_reads_of(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    async fn count_read(&self, object: &ObjectInBucket) -> StorageResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        if self.failing_keys.lock().unwrap().contains(&object.key) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "injected read failure for {}",
                object.key
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn head(&self, object: &ObjectInBucket) -> StorageResult<Option<ObjectMeta>> {
        self.inner.head(object).await
    }

    async fn get(&self, object: &ObjectInBucket) -> StorageResult<Option<Bytes>> {
        self.count_read(object).await?;
        self.inner.get(object).await
    }

    async fn get_stream(&self, object: &ObjectInBucket) -> StorageResult<Option<ByteStream>> {
        self.count_read(object).await?;
        self.inner.get_stream(object).await
    }

    async fn put(
        &self,
        object: &ObjectInBucket,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put(object, data, content_type).await
    }

    async fn put_file(
        &self,
        object: &ObjectInBucket,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.put_file(object, path, content_type).await
    }

    async fn delete(&self, object: &ObjectInBucket) -> StorageResult<()> {
        self.inner.delete(object).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    async fn health_check(&self, bucket: &str) -> StorageResult<()> {
        self.inner.health_check(bucket).await
    }
}
