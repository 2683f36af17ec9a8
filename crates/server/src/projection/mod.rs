//! Persisted projections of named-query results.
//!
//! A projection (zip archive, PDF) is built once per storage key and cached in
//! the output bucket. A control file stored next to it records whether a
//! build is running or finished. Within this process the keyed lock allows a
//! single builder per key; across processes a build that stops updating its
//! control file is taken over once the file is older than the staleness
//! threshold.

pub mod pdf;
pub mod zip;

pub use self::pdf::PdfCreator;
pub use self::zip::ZipCreator;

use crate::access::AccessValidator;
use crate::error::{ApiError, ApiResult};
use crate::keyed_lock::KeyedLock;
use crate::metrics;
use async_trait::async_trait;
use axum::http::HeaderMap;
use bytes::Bytes;
use futures::TryStreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tessera_catalog::NamedQueryResultGenerator;
use tessera_core::config::NamedQueryConfig;
use tessera_core::{
    Asset, ControlFile, ParsedNamedQuery, PersistedProjectionStatus, ProjectionKind,
};
use tessera_storage::{BlobStore, ByteStream, ObjectInBucket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds one kind of projection artifact.
#[async_trait]
pub trait ProjectionCreator: Send + Sync {
    fn kind(&self) -> ProjectionKind;

    /// Build the artifact for `assets` and store it at `output`, returning
    /// its size in bytes.
    async fn create(
        &self,
        query: &ParsedNamedQuery,
        assets: &[Asset],
        output: &ObjectInBucket,
        cancel: &CancellationToken,
    ) -> ApiResult<u64>;
}

/// Outcome of a projection request.
pub struct PersistedProjection {
    pub status: PersistedProjectionStatus,
    pub stream: Option<ByteStream>,
    pub size: Option<u64>,
}

impl PersistedProjection {
    fn status(status: PersistedProjectionStatus) -> Self {
        Self {
            status,
            stream: None,
            size: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_none()
    }
}

impl std::fmt::Debug for PersistedProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedProjection")
            .field("status", &self.status)
            .field("size", &self.size)
            .field("has_stream", &self.stream.is_some())
            .finish()
    }
}

/// Runs the control-file protocol in front of any [`ProjectionCreator`].
pub struct ControlFileCoordinator {
    storage: Arc<dyn BlobStore>,
    generator: NamedQueryResultGenerator,
    access: Arc<dyn AccessValidator>,
    locks: KeyedLock,
    output_bucket: String,
    config: NamedQueryConfig,
}

impl ControlFileCoordinator {
    pub fn new(
        storage: Arc<dyn BlobStore>,
        generator: NamedQueryResultGenerator,
        access: Arc<dyn AccessValidator>,
        locks: KeyedLock,
        output_bucket: impl Into<String>,
        config: NamedQueryConfig,
    ) -> Self {
        Self {
            storage,
            generator,
            access,
            locks,
            output_bucket: output_bucket.into(),
            config,
        }
    }

    fn artifact(&self, query: &ParsedNamedQuery) -> ObjectInBucket {
        ObjectInBucket::new(&self.output_bucket, &query.storage_key)
    }

    fn control_object(&self, query: &ParsedNamedQuery) -> ObjectInBucket {
        ObjectInBucket::new(&self.output_bucket, &query.control_file_key)
    }

    /// Read the control file for `query`, if one has been written.
    pub async fn get_control_file(&self, query: &ParsedNamedQuery) -> ApiResult<Option<ControlFile>> {
        match self.storage.get(&self.control_object(query)).await? {
            Some(data) => Ok(Some(ControlFile::from_json(&data)?)),
            None => Ok(None),
        }
    }

    async fn put_control_file(&self, query: &ParsedNamedQuery, control: &ControlFile) -> ApiResult<()> {
        self.storage
            .put(
                &self.control_object(query),
                Bytes::from(control.to_json()?),
                "application/json",
            )
            .await?;
        Ok(())
    }

    /// Serve the projection for `query`, building it if needed.
    ///
    /// A build started by another caller is reported as `InProcess` rather
    /// than waited on. A failed build leaves its control file in process so
    /// it is retried once stale.
    pub async fn get_projection(
        &self,
        query: &ParsedNamedQuery,
        creator: &dyn ProjectionCreator,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> ApiResult<PersistedProjection> {
        if query.faulty {
            return Err(ApiError::BadRequest(
                query.error_message.clone().unwrap_or_default(),
            ));
        }

        let projection = self.resolve(query, creator, headers, cancel).await?;
        metrics::PROJECTION_RESULTS
            .with_label_values(&[creator.kind().as_str(), projection.status.as_str()])
            .inc();
        Ok(projection)
    }

    async fn resolve(
        &self,
        query: &ParsedNamedQuery,
        creator: &dyn ProjectionCreator,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> ApiResult<PersistedProjection> {
        if let Some(projection) = self.existing(query, headers).await? {
            return Ok(projection);
        }

        let Some(_guard) = self.locks.try_acquire(&query.storage_key) else {
            debug!(storage_key = %query.storage_key, "Build already running in this process");
            return Ok(PersistedProjection::status(PersistedProjectionStatus::InProcess));
        };

        // A build may have completed between the first check and taking the lock
        if let Some(projection) = self.existing(query, headers).await? {
            return Ok(projection);
        }

        self.build(query, creator, headers, cancel).await
    }

    /// Outcome decided by the current control file, or `None` when a build
    /// is required.
    async fn existing(
        &self,
        query: &ParsedNamedQuery,
        headers: &HeaderMap,
    ) -> ApiResult<Option<PersistedProjection>> {
        let Some(mut control) = self.get_control_file(query).await? else {
            return Ok(None);
        };
        let stale_secs = self.config.control_stale_secs;

        // Callers who may not view the result learn nothing about the build
        if !self.can_view(query, &control, headers).await {
            return Ok(Some(PersistedProjection::status(
                PersistedProjectionStatus::Restricted,
            )));
        }

        if control.in_process && !control.is_stale(stale_secs) {
            return Ok(Some(PersistedProjection::status(
                PersistedProjectionStatus::InProcess,
            )));
        }

        let artifact = self.storage.head(&self.artifact(query)).await?;

        if control.in_process {
            // Stale. The builder may have uploaded the artifact but died
            // before updating the control file.
            match artifact {
                Some(meta) if meta.last_modified.is_some_and(|m| m > control.created) => {
                    info!(storage_key = %query.storage_key, "Repairing stale control file");
                    control.complete(meta.size);
                    self.put_control_file(query, &control).await?;
                    return self.available(query, &control).await.map(Some);
                }
                _ => {
                    warn!(
                        storage_key = %query.storage_key,
                        created = %control.created,
                        "Control file is stale, rebuilding"
                    );
                    return Ok(None);
                }
            }
        }

        if control.exists && artifact.is_some() {
            return self.available(query, &control).await.map(Some);
        }

        debug!(storage_key = %query.storage_key, "Control file present but artifact missing");
        Ok(None)
    }

    /// Whether the caller may view the projection described by `control`.
    async fn can_view(
        &self,
        query: &ParsedNamedQuery,
        control: &ControlFile,
        headers: &HeaderMap,
    ) -> bool {
        !control.requires_auth()
            || self
                .access
                .can_view(query.customer, &control.roles, headers)
                .await
    }

    /// Stream a finished artifact.
    async fn available(
        &self,
        query: &ParsedNamedQuery,
        control: &ControlFile,
    ) -> ApiResult<PersistedProjection> {
        match self.storage.get_stream(&self.artifact(query)).await? {
            Some(stream) => Ok(PersistedProjection {
                status: PersistedProjectionStatus::Available,
                stream: Some(stream),
                size: Some(control.size_bytes),
            }),
            None => Ok(PersistedProjection::status(PersistedProjectionStatus::NotFound)),
        }
    }

    async fn build(
        &self,
        query: &ParsedNamedQuery,
        creator: &dyn ProjectionCreator,
        headers: &HeaderMap,
        cancel: &CancellationToken,
    ) -> ApiResult<PersistedProjection> {
        let kind = creator.kind().as_str();
        let assets: Vec<Asset> = self.generator.execute(query).await?.try_collect().await?;
        if assets.is_empty() {
            debug!(storage_key = %query.storage_key, "Named query matched no assets");
            return Ok(PersistedProjection::status(PersistedProjectionStatus::NotFound));
        }

        let roles = projection_roles(&assets, self.config.roles_whitelist(query.customer));
        let mut control = ControlFile::in_process(&query.storage_key, assets.len() as u64, roles);
        self.put_control_file(query, &control).await?;

        metrics::record_projection_build(kind, "started");
        info!(
            storage_key = %query.storage_key,
            kind,
            items = assets.len(),
            "Building projection"
        );
        let start = Instant::now();

        match creator.create(query, &assets, &self.artifact(query), cancel).await {
            Ok(size) => {
                control.complete(size);
                self.put_control_file(query, &control).await?;
                metrics::record_projection_build(kind, "succeeded");
                metrics::PROJECTION_BUILD_DURATION
                    .with_label_values(&[kind])
                    .observe(start.elapsed().as_secs_f64());
                info!(storage_key = %query.storage_key, size, "Projection built");
                if !self.can_view(query, &control, headers).await {
                    return Ok(PersistedProjection::status(
                        PersistedProjectionStatus::Restricted,
                    ));
                }
                self.available(query, &control).await
            }
            Err(e) => {
                metrics::record_projection_build(kind, "failed");
                warn!(storage_key = %query.storage_key, error = %e, "Projection build failed");
                Ok(PersistedProjection::status(PersistedProjectionStatus::Error))
            }
        }
    }
}

/// Roles carried by any asset that the customer has whitelisted, sorted.
fn projection_roles(assets: &[Asset], whitelist: &[String]) -> Vec<String> {
    let roles: BTreeSet<&String> = assets
        .iter()
        .flat_map(|a| a.roles.iter())
        .filter(|role| whitelist.contains(role))
        .collect();
    roles.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::AssetId;

    fn asset(id: &str, roles: &[&str]) -> Asset {
        let mut asset = Asset::new(AssetId::parse(id).unwrap(), 1, 1);
        asset.roles = roles.iter().map(|r| r.to_string()).collect();
        asset
    }

    #[test]
    fn test_projection_roles_intersect_whitelist() {
        let assets = vec![
            asset("1/1/a", &["clickthrough", "staff"]),
            asset("1/1/b", &[]),
            asset("1/1/c", &["clickthrough", "admin"]),
        ];
        let whitelist = vec!["clickthrough".to_string(), "admin".to_string()];
        assert_eq!(
            projection_roles(&assets, &whitelist),
            vec!["admin".to_string(), "clickthrough".to_string()]
        );
        assert!(projection_roles(&assets, &[]).is_empty());
    }

    #[test]
    fn test_persisted_projection_is_empty() {
        let projection = PersistedProjection::status(PersistedProjectionStatus::InProcess);
        assert!(projection.is_empty());
        assert_eq!(
            format!("{projection:?}"),
            "PersistedProjection { status: InProcess, size: None, has_stream: false }"
        );
    }
}
