//! Blob storage abstraction and backends for tessera.
//!
//! This crate provides:
//! - Bucketed blob storage addressed by [`ObjectInBucket`]
//! - Backends: local filesystem and S3-compatible
//! - The local fast-storage file store used for orchestrated images

pub mod backends;
pub mod error;
pub mod local;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, s3::S3Backend};
pub use error::{StorageError, StorageResult};
pub use local::LocalFileStore;
pub use traits::{BlobStore, ByteStream, ObjectInBucket, ObjectMeta};

use std::sync::Arc;
use tessera_core::config::StorageConfig;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            endpoint,
            region,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(
                endpoint.clone(),
                region.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
                *force_path_style,
            )
            .await?;
            Ok(Arc::new(backend))
        }
    }
}
