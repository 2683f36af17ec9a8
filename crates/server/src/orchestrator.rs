//! Materialisation of assets into fast local storage.
//!
//! The downstream image server only reads local files. Before a request is
//! proxied the asset is copied from blob storage to a path derived from its
//! id, at most once at a time per asset.

use crate::error::{ApiError, ApiResult};
use crate::keyed_lock::KeyedLock;
use crate::metrics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_catalog::{AssetRepo, AssetStore};
use tessera_core::config::{BucketConfig, OrchestratorConfig};
use tessera_core::local_path::expand_template;
use tessera_core::{Asset, AssetId};
use tessera_storage::{BlobStore, LocalFileStore, ObjectInBucket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Where an asset stands with respect to fast storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestrationStatus {
    NotOrchestrated,
    Orchestrating,
    Orchestrated,
}

impl OrchestrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotOrchestrated => "not-orchestrated",
            Self::Orchestrating => "orchestrating",
            Self::Orchestrated => "orchestrated",
        }
    }
}

fn lock_key(asset_id: &AssetId) -> String {
    format!("orch:{asset_id}")
}

/// Copies assets into fast storage on demand.
pub struct ImageOrchestrator {
    storage: Arc<dyn BlobStore>,
    catalog: Arc<dyn AssetStore>,
    local: LocalFileStore,
    locks: KeyedLock,
    buckets: BucketConfig,
    config: OrchestratorConfig,
}

impl ImageOrchestrator {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        catalog: Arc<dyn AssetStore>,
        locks: KeyedLock,
        buckets: BucketConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            storage,
            catalog,
            local: LocalFileStore::new(),
            locks,
            buckets,
            config,
        }
    }

    /// Fast-storage path for an asset.
    pub fn local_path(&self, asset_id: &AssetId) -> PathBuf {
        let root = self.config.local_root.to_string_lossy();
        PathBuf::from(expand_template(&self.config.path_template, &root, asset_id))
    }

    /// Look up an asset that may be delivered. Unknown and not-for-delivery
    /// assets are both reported as not found.
    pub async fn deliverable_asset(&self, asset_id: &AssetId) -> ApiResult<Asset> {
        match self.catalog.get_asset(asset_id).await? {
            Some(asset) if !asset.not_for_delivery => Ok(asset),
            _ => Err(ApiError::NotFound(format!("asset {asset_id}"))),
        }
    }

    /// Current status of `asset_id`. Never waits on the asset lock.
    pub async fn get_orchestration_status(
        &self,
        asset_id: &AssetId,
    ) -> ApiResult<OrchestrationStatus> {
        let status = if self.local.exists(&self.local_path(asset_id)).await? {
            OrchestrationStatus::Orchestrated
        } else {
            match self.locks.try_acquire(&lock_key(asset_id)) {
                Some(_guard) => OrchestrationStatus::NotOrchestrated,
                None => {
                    metrics::ORCHESTRATION_IN_FLIGHT_OBSERVED.inc();
                    OrchestrationStatus::Orchestrating
                }
            }
        };
        debug!(asset_id = %asset_id, status = status.as_str(), "Orchestration status");
        Ok(status)
    }

    /// Make sure `asset` is present in fast storage.
    ///
    /// Waits up to `timeout` (default: the configured critical path timeout)
    /// for a concurrent orchestration of the same asset, then re-checks
    /// presence before copying. On any failure the local file is left absent.
    #[instrument(skip(self, asset, cancel), fields(asset_id = %asset.id))]
    pub async fn orchestrate_image(
        &self,
        asset: &Asset,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ApiResult<()> {
        if asset.not_for_delivery {
            return Err(ApiError::NotFound(format!("asset {}", asset.id)));
        }

        let path = self.local_path(&asset.id);
        if self.local.exists(&path).await? {
            self.touch(&path).await;
            return Ok(());
        }

        let timeout = timeout.unwrap_or_else(|| self.config.critical_path_timeout());
        let key = lock_key(&asset.id);
        let guard = tokio::select! {
            guard = self.locks.acquire_timeout(&key, timeout) => guard,
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
        };
        let Some(_guard) = guard else {
            metrics::record_orchestration_failure("timeout");
            warn!(timeout_ms = timeout.as_millis() as u64, "Timed out waiting for asset lock");
            return Err(ApiError::OrchestrationTimeout(asset.id.to_string()));
        };

        // Another request may have finished while we waited
        if self.local.exists(&path).await? {
            debug!("Orchestrated by a concurrent request");
            self.touch(&path).await;
            return Ok(());
        }

        metrics::ORCHESTRATIONS_STARTED.inc();
        let start = Instant::now();
        let result = tokio::select! {
            result = self.copy_to_local(&asset.id, &path) => result,
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
        };

        match result {
            Ok(bytes) => {
                metrics::ORCHESTRATIONS_COMPLETED.inc();
                metrics::ORCHESTRATED_BYTES.inc_by(bytes);
                metrics::ORCHESTRATION_DURATION.observe(start.elapsed().as_secs_f64());
                info!(path = %path.display(), bytes, "Asset orchestrated");
                Ok(())
            }
            Err(e) => {
                let reason = match &e {
                    ApiError::NotFound(_) => "not_found",
                    ApiError::Cancelled => "cancelled",
                    _ => "error",
                };
                metrics::record_orchestration_failure(reason);
                warn!(error = %e, "Orchestration failed");
                Err(e)
            }
        }
    }

    /// Copy the original, or failing that the largest thumbnail, to `path`.
    async fn copy_to_local(&self, asset_id: &AssetId, path: &std::path::Path) -> ApiResult<u64> {
        let sources = [
            ObjectInBucket::new(&self.buckets.storage, asset_id.storage_key()),
            ObjectInBucket::new(&self.buckets.thumbs, asset_id.largest_thumbnail_key()),
        ];

        for source in &sources {
            if let Some(stream) = self.storage.get_stream(source).await? {
                debug!(source = %source, "Copying to fast storage");
                return Ok(self.local.write_stream(path, stream).await?);
            }
        }

        Err(ApiError::NotFound(format!(
            "no stored bytes for asset {asset_id}"
        )))
    }

    async fn touch(&self, path: &std::path::Path) {
        if let Err(e) = self.local.touch(path).await {
            warn!(path = %path.display(), error = %e, "Failed to touch orchestrated file");
        }
    }
}
