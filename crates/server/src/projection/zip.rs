//! Zip archive projections of thumbnail derivatives.

use super::ProjectionCreator;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_core::{Asset, ParsedNamedQuery, ProjectionKind};
use tessera_storage::{BlobStore, ObjectInBucket};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Entries buffered between the fetch loop and the archive writer.
const ENTRY_BUFFER: usize = 4;

/// Removes the scratch archive however the build ends.
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.0.display(), error = %e, "Failed to remove scratch archive");
        }
    }
}

/// Packs the largest thumbnail of every open asset into a zip archive.
pub struct ZipCreator {
    storage: Arc<dyn BlobStore>,
    thumbs_bucket: String,
    temp_dir: PathBuf,
}

impl ZipCreator {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        thumbs_bucket: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            thumbs_bucket: thumbs_bucket.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Scratch path for the archive of `storage_key`, flattened to a single
    /// file name directly under the scratch directory.
    pub fn temp_path(&self, storage_key: &str) -> PathBuf {
        let file_name = storage_key.replace(['/', '\\'], "_");
        self.temp_dir.join(format!("{file_name}.zip"))
    }

    /// Fetch the redistribution derivative of `asset`. Failures are logged and
    /// yield `None` so one bad asset never aborts the archive.
    async fn fetch_entry(&self, asset: &Asset) -> Option<Bytes> {
        let object = ObjectInBucket::new(&self.thumbs_bucket, asset.redistribution_key());
        match self.storage.get(&object).await {
            Ok(Some(data)) => Some(data),
            Ok(None) => {
                warn!(asset_id = %asset.id, object = %object, "Derivative missing, skipping asset");
                None
            }
            Err(e) => {
                warn!(asset_id = %asset.id, error = %e, "Failed to fetch derivative, skipping asset");
                None
            }
        }
    }
}

/// Archive entry name for `asset`, unique within `taken`.
///
/// Names are `{name}.jpg`, qualified with the space when assets from
/// different spaces share a name. `None` means the asset is already present.
fn entry_name(taken: &mut HashSet<String>, asset: &Asset) -> Option<String> {
    let plain = format!("{}.jpg", asset.id.name());
    if taken.insert(plain.clone()) {
        return Some(plain);
    }
    let qualified = format!("{}_{}.jpg", asset.id.space(), asset.id.name());
    if taken.insert(qualified.clone()) {
        debug!(asset_id = %asset.id, entry = %qualified, "Entry name taken, qualifying with space");
        return Some(qualified);
    }
    None
}

/// Write entries received on `entries` into a new archive at `path`.
fn write_archive(path: &Path, mut entries: mpsc::Receiver<(String, Bytes)>) -> std::io::Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut archive = ZipWriter::new(std::io::BufWriter::new(file));
    // JPEG data does not compress further
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    let mut count = 0;
    while let Some((name, data)) = entries.blocking_recv() {
        archive.start_file(name, options).map_err(std::io::Error::other)?;
        archive.write_all(&data)?;
        count += 1;
    }

    let mut writer = archive.finish().map_err(std::io::Error::other)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(count)
}

#[async_trait]
impl ProjectionCreator for ZipCreator {
    fn kind(&self) -> ProjectionKind {
        ProjectionKind::Zip
    }

    async fn create(
        &self,
        query: &ParsedNamedQuery,
        assets: &[Asset],
        output: &ObjectInBucket,
        cancel: &CancellationToken,
    ) -> ApiResult<u64> {
        let temp_path = self.temp_path(&query.storage_key);
        let _scratch = ScratchFile(temp_path.clone());

        let (tx, rx) = mpsc::channel(ENTRY_BUFFER);
        let writer = {
            let path = temp_path.clone();
            tokio::task::spawn_blocking(move || write_archive(&path, rx))
        };

        let mut names = HashSet::new();
        let mut cancelled = false;
        for asset in assets {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if asset.requires_auth() {
                debug!(asset_id = %asset.id, "Skipping asset that requires authorization");
                continue;
            }

            let Some(name) = entry_name(&mut names, asset) else {
                warn!(asset_id = %asset.id, "Asset already in archive, skipping");
                continue;
            };
            let Some(data) = self.fetch_entry(asset).await else {
                continue;
            };
            if tx.send((name, data)).await.is_err() {
                // The writer stopped early; its error is reported below
                break;
            }
        }
        drop(tx);

        let entries = writer
            .await
            .map_err(|e| ApiError::Internal(format!("archive writer panicked: {e}")))?
            .map_err(|e| ApiError::Build(format!("failed to write archive: {e}")))?;
        if cancelled {
            return Err(ApiError::Cancelled);
        }

        let size = self
            .storage
            .put_file(output, &temp_path, ProjectionKind::Zip.content_type())
            .await?;
        info!(output = %output, entries, size, "Uploaded zip archive");
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tessera_core::AssetId;
    use tessera_storage::FilesystemBackend;

    #[test]
    fn test_write_archive_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.zip");
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(("a.jpg".to_string(), Bytes::from_static(b"aaa")))
            .unwrap();
        tx.try_send(("b.jpg".to_string(), Bytes::from_static(b"bb")))
            .unwrap();
        drop(tx);

        assert_eq!(write_archive(&path, rx).unwrap(), 2);

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive
            .by_name("b.jpg")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "bb");
    }

    #[tokio::test]
    async fn test_temp_path_stays_in_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn BlobStore> =
            Arc::new(FilesystemBackend::new(dir.path().join("blobs")).await.unwrap());
        let scratch = dir.path().join("scratch");
        let creator = ZipCreator::new(storage, "thumbs", &scratch);

        let path = creator.temp_path("99/zip/q/1/../../../../../../tmp/victim/Untitled");
        assert_eq!(path.parent(), Some(scratch.as_path()));
        assert_eq!(
            path.file_name().unwrap(),
            "99_zip_q_1_.._.._.._.._.._.._tmp_victim_Untitled.zip"
        );
    }

    #[test]
    fn test_entry_names_unique_across_spaces() {
        let mut taken = HashSet::new();
        let first = Asset::new(AssetId::parse("1/1/page").unwrap(), 1, 1);
        let second = Asset::new(AssetId::parse("1/2/page").unwrap(), 1, 1);

        assert_eq!(entry_name(&mut taken, &first).as_deref(), Some("page.jpg"));
        assert_eq!(entry_name(&mut taken, &second).as_deref(), Some("2_page.jpg"));
        assert_eq!(entry_name(&mut taken, &second), None);
    }

    #[tokio::test]
    async fn test_cancelled_build_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn BlobStore> =
            Arc::new(FilesystemBackend::new(dir.path().join("blobs")).await.unwrap());
        let creator = ZipCreator::new(storage.clone(), "thumbs", dir.path().join("scratch"));

        let query = tessera_core::parse_named_query(
            1,
            "q",
            "space=p1",
            Some("1"),
            ProjectionKind::Zip,
        )
        .unwrap();
        let assets = vec![Asset::new(AssetId::parse("1/1/a").unwrap(), 1, 1)];
        let output = ObjectInBucket::new("output", &query.storage_key);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = creator
            .create(&query, &assets, &output, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Cancelled));
        assert!(!creator.temp_path(&query.storage_key).exists());
        assert!(storage.head(&output).await.unwrap().is_none());
    }
}
