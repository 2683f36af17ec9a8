//! Fast local storage read by the downstream image server.

use crate::error::{StorageError, StorageResult};
use crate::traits::ByteStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Removes a temp file on drop unless disarmed, so a dropped or cancelled
/// write never leaves partial data behind.
struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// File operations on the local fast-storage volume.
#[derive(Clone, Debug, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }

    pub async fn exists(&self, path: &Path) -> StorageResult<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Set the file's modification time to now.
    #[instrument(skip(self))]
    pub async fn touch(&self, path: &Path) -> StorageResult<()> {
        let path = path.to_path_buf();
        let key = path.to_string_lossy().to_string();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::options().write(true).open(&path)?;
            file.set_modified(SystemTime::now())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
        .map_err(|e| StorageError::from_io(e, &key))
    }

    /// Modification time of the file, `None` when absent.
    pub async fn last_write(&self, path: &Path) -> StorageResult<Option<OffsetDateTime>> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.modified().ok().map(OffsetDateTime::from)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write a byte stream to `path`, returning the number of bytes written.
    ///
    /// Data lands in a sibling temp file that is renamed into place once
    /// complete. On error, or if the future is dropped, the temp file is removed
    /// and `path` is left untouched.
    #[instrument(skip(self, stream))]
    pub async fn write_stream(&self, path: &Path, mut stream: ByteStream) -> StorageResult<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| StorageError::InvalidKey(format!("no file name in {path:?}")))?;
        let temp_path = path.with_file_name(format!("{file_name}.tmp.{}", Uuid::new_v4()));
        let mut guard = TempFileGuard::new(temp_path.clone());

        let mut file = fs::File::create(&temp_path).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        guard.disarm();

        debug!(path = %path.display(), bytes = written, "Wrote local file");
        Ok(written)
    }

    /// Remove the file. Removing an absent file succeeds.
    pub async fn remove(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn stream_of(chunks: Vec<StorageResult<Bytes>>) -> ByteStream {
        Box::pin(futures::stream::iter(chunks))
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_write_stream_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let path = dir.path().join("1/2/fo/ob/foobarbaz/foobarbaz.jp2");

        let written = store
            .write_stream(
                &path,
                stream_of(vec![Ok(Bytes::from("abc")), Ok(Bytes::from("def"))]),
            )
            .await
            .unwrap();

        assert_eq!(written, 6);
        assert!(store.exists(&path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
        assert_eq!(dir_entries(path.parent().unwrap()), vec!["foobarbaz.jp2"]);
    }

    #[tokio::test]
    async fn test_write_stream_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let path = dir.path().join("image.jp2");

        let result = store
            .write_stream(
                &path,
                stream_of(vec![
                    Ok(Bytes::from("abc")),
                    Err(StorageError::Io(std::io::Error::other("source failed"))),
                ]),
            )
            .await;

        assert!(result.is_err());
        assert!(!store.exists(&path).await.unwrap());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_dropped_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let path = dir.path().join("image.jp2");

        let pending: ByteStream = Box::pin(
            futures::stream::iter(vec![Ok(Bytes::from("abc"))]).chain(futures::stream::pending()),
        );
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            store.write_stream(&path, pending),
        )
        .await;

        assert!(result.is_err());
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_touch_updates_last_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let path = dir.path().join("image.jp2");
        std::fs::write(&path, b"x").unwrap();

        let old = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();
        let before = store.last_write(&path).await.unwrap().unwrap();

        store.touch(&path).await.unwrap();
        let after = store.last_write(&path).await.unwrap().unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_absent_file_operations() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new();
        let path = dir.path().join("missing.jp2");

        assert!(!store.exists(&path).await.unwrap());
        assert!(store.last_write(&path).await.unwrap().is_none());
        assert!(matches!(
            store.touch(&path).await,
            Err(StorageError::NotFound(_))
        ));
        store.remove(&path).await.unwrap();
    }
}
