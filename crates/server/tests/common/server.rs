//! Server test utilities.

use super::fixtures::CountingCatalog;
use super::storage::CountingBlobStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tessera_core::config::{AppConfig, StorageConfig};
use tessera_server::{AppState, OpenContentOnly, create_router};
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub storage: Arc<CountingBlobStore>,
    pub catalog: Arc<CountingCatalog>,
    pub temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server, letting `configure` adjust the config first.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        Self::build(configure, Duration::ZERO).await
    }

    /// Create a test server whose storage reads are slowed down.
    pub async fn with_read_delay(read_delay: Duration) -> Self {
        Self::build(|_| {}, read_delay).await
    }

    async fn build(configure: impl FnOnce(&mut AppConfig), read_delay: Duration) -> Self {
        tessera_server::metrics::register_metrics();

        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");

        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: storage_path.clone(),
        };
        config.orchestrator.local_root = temp_dir.path().join("nas");
        config.named_query.zip_temp_dir = temp_dir.path().join("scratch");
        configure(&mut config);

        let storage = CountingBlobStore::with_read_delay(&storage_path, read_delay).await;
        let catalog = Arc::new(CountingCatalog::new().await);
        let state = AppState::new(
            config,
            storage.clone(),
            catalog.clone(),
            Arc::new(OpenContentOnly),
        )
        .expect("Failed to create app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            storage,
            catalog,
            temp_dir,
        }
    }

    /// Send a GET request through the router.
    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    /// Send a GET request and collect status and body.
    pub async fn get_bytes(&self, uri: &str) -> (StatusCode, Bytes) {
        let response = self.get(uri).await;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        (status, body)
    }

    /// Seed the largest thumbnail of `asset_id`.
    pub async fn seed_thumbnail(&self, asset_id: &str, data: &'static [u8]) {
        let bucket = self.state.config.buckets.thumbs.clone();
        self.storage
            .seed(&bucket, &format!("{asset_id}/low.jpg"), data)
            .await;
    }

    /// Seed the original of `asset_id`.
    pub async fn seed_original(&self, asset_id: &str, data: &'static [u8]) {
        let bucket = self.state.config.buckets.storage.clone();
        self.storage.seed(&bucket, asset_id, data).await;
    }
}
