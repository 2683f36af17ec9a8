//! Application state shared across handlers.

use crate::access::AccessValidator;
use crate::destinations::DestinationSelector;
use crate::keyed_lock::KeyedLock;
use crate::orchestrator::ImageOrchestrator;
use crate::path_parser::PathParser;
use crate::projection::{ControlFileCoordinator, PdfCreator, ProjectionCreator, ZipCreator};
use crate::proxy::DownstreamProxy;
use std::sync::Arc;
use tessera_catalog::{AssetStore, NamedQueryResultGenerator};
use tessera_core::ProjectionKind;
use tessera_core::config::AppConfig;
use tessera_storage::BlobStore;
use tokio_util::sync::CancellationToken;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob storage holding originals, thumbnails and projections.
    pub storage: Arc<dyn BlobStore>,
    /// Asset catalog.
    pub catalog: Arc<dyn AssetStore>,
    /// Lock table shared by orchestration and projection builds. Keys
    /// never collide because orchestration keys carry an `orch:` prefix.
    pub locks: KeyedLock,
    pub path_parser: PathParser,
    pub destinations: Arc<DestinationSelector>,
    pub orchestrator: Arc<ImageOrchestrator>,
    pub proxy: DownstreamProxy,
    pub coordinator: Arc<ControlFileCoordinator>,
    pub zip: Arc<ZipCreator>,
    pub pdf: Arc<PdfCreator>,
    /// Cancelled on shutdown; long-running work uses child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        catalog: Arc<dyn AssetStore>,
        access: Arc<dyn AccessValidator>,
    ) -> tessera_core::Result<Self> {
        config.validate().map_err(tessera_core::Error::InvalidConfig)?;

        let locks = KeyedLock::new();
        let orchestrator = ImageOrchestrator::new(
            storage.clone(),
            catalog.clone(),
            locks.clone(),
            config.buckets.clone(),
            config.orchestrator.clone(),
        );
        let coordinator = ControlFileCoordinator::new(
            storage.clone(),
            NamedQueryResultGenerator::new(catalog.clone()),
            access,
            locks.clone(),
            config.buckets.output.clone(),
            config.named_query.clone(),
        );
        let zip = ZipCreator::new(
            storage.clone(),
            config.buckets.thumbs.clone(),
            config.named_query.zip_temp_dir.clone(),
        );
        let pdf = PdfCreator::new(
            config.named_query.pdf_renderer_url.clone(),
            config.buckets.thumbs.clone(),
        );

        Ok(Self {
            locks,
            path_parser: PathParser::new(catalog.clone()),
            destinations: Arc::new(DestinationSelector::new(
                &config.proxy,
                config.orchestrator.image_server,
            )),
            orchestrator: Arc::new(orchestrator),
            proxy: DownstreamProxy::new(config.orchestrator.image_server_path_template.clone()),
            coordinator: Arc::new(coordinator),
            zip: Arc::new(zip),
            pdf: Arc::new(pdf),
            shutdown: CancellationToken::new(),
            config: Arc::new(config),
            storage,
            catalog,
        })
    }

    /// Creator for a projection kind.
    pub fn creator(&self, kind: ProjectionKind) -> &dyn ProjectionCreator {
        match kind {
            ProjectionKind::Zip => self.zip.as_ref(),
            ProjectionKind::Pdf => self.pdf.as_ref(),
        }
    }
}
