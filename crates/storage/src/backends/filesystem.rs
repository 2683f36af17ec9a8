//! Local filesystem blob store. Buckets are directories under the root.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, ByteStream, ObjectInBucket, ObjectMeta};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem-backed blob store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the full path for an object, with path traversal protection.
    async fn object_path(&self, object: &ObjectInBucket) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let object = object.clone();
        tokio::task::spawn_blocking(move || Self::object_path_sync(&root, &object))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Rejects buckets and keys that would escape the storage root, including
    /// through symlinks already present under it.
    fn object_path_sync(root: &Path, object: &ObjectInBucket) -> StorageResult<PathBuf> {
        if object.bucket.is_empty() || object.bucket.contains(['/', '\\']) {
            return Err(StorageError::InvalidKey(format!(
                "invalid bucket name: {}",
                object.bucket
            )));
        }
        let key = object.key.as_str();
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(&object.bucket).join(key);
        let root_canonical = root.canonicalize()?;

        // Nearest existing ancestor (or the path itself) must resolve inside the root.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            match std::fs::symlink_metadata(current) {
                Ok(_) => {
                    let canonical = current.canonicalize().map_err(|_| {
                        StorageError::InvalidKey(format!("symlink target missing or invalid: {key}"))
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::Io(err)),
            }
            candidate = current.parent();
        }

        Ok(path)
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn temp_path_for(path: &Path) -> PathBuf {
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        )
    }

    async fn open(&self, object: &ObjectInBucket) -> StorageResult<Option<fs::File>> {
        let path = self.object_path(object).await?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, object: &ObjectInBucket) -> StorageResult<Option<ObjectMeta>> {
        let path = self.object_path(object).await?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        Ok(Some(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
            content_type: None,
        }))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, object: &ObjectInBucket) -> StorageResult<Option<Bytes>> {
        let path = self.object_path(object).await?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, object: &ObjectInBucket) -> StorageResult<Option<ByteStream>> {
        use tokio::io::AsyncReadExt;

        let Some(file) = self.open(object).await? else {
            return Ok(None);
        };

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Some(Box::pin(stream)))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(
        &self,
        object: &ObjectInBucket,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        let path = self.object_path(object).await?;
        self.ensure_parent(&path).await?;

        // Temp file + fsync + rename so readers never observe a partial object
        let temp_path = Self::temp_path_for(&path);
        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_file(
        &self,
        object: &ObjectInBucket,
        source: &Path,
        _content_type: &str,
    ) -> StorageResult<u64> {
        let path = self.object_path(object).await?;
        self.ensure_parent(&path).await?;

        let temp_path = Self::temp_path_for(&path);
        let copied = async {
            let size = fs::copy(source, &temp_path).await?;
            fs::File::open(&temp_path).await?.sync_all().await?;
            fs::rename(&temp_path, &path).await?;
            Ok::<_, std::io::Error>(size)
        }
        .await;

        match copied {
            Ok(size) => Ok(size),
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(StorageError::from_io(e, &source.to_string_lossy()))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, object: &ObjectInBucket) -> StorageResult<()> {
        let path = self.object_path(object).await?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self, _bucket: &str) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
