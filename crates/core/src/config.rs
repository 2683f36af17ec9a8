//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    /// Route prefix for image requests.
    #[serde(default = "default_image_path")]
    pub image_path: String,
    /// Route prefix for thumbnail requests.
    #[serde(default = "default_thumbs_path")]
    pub thumbs_path: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_image_path() -> String {
    "iiif-img".to_string()
}

fn default_thumbs_path() -> String {
    "thumbs".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
            image_path: default_image_path(),
            thumbs_path: default_thumbs_path(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, prefix) in [
            ("image_path", &self.image_path),
            ("thumbs_path", &self.thumbs_path),
        ] {
            if prefix.is_empty() || prefix.contains('/') {
                return Err(format!(
                    "server.{name} must be a single non-empty path segment, got '{prefix}'"
                ));
            }
        }
        if self.image_path == self.thumbs_path {
            return Err("server.image_path and server.thumbs_path must differ".to_string());
        }
        Ok(())
    }
}

/// Blob store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage. Buckets are directories under `path`.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// AWS access key ID. Falls back to the default credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the default credential chain if not set.
        secret_access_key: Option<String>,
        /// Force path-style URLs (`endpoint/bucket/key`). Required for MinIO.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                access_key_id,
                secret_access_key,
                ..
            } => match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                (Some(_), Some(_)) | (None, None) => Ok(()),
                _ => Err(
                    "s3 config requires both access_key_id and secret_access_key when either is set"
                        .to_string(),
                ),
            },
            _ => Ok(()),
        }
    }
}

/// Bucket names used by the service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Originals and full-resolution derivatives.
    #[serde(default = "default_storage_bucket")]
    pub storage: String,
    /// Pre-rendered thumbnails.
    #[serde(default = "default_thumbs_bucket")]
    pub thumbs: String,
    /// Persisted projections and their control files.
    #[serde(default = "default_output_bucket")]
    pub output: String,
}

fn default_storage_bucket() -> String {
    "storage".to_string()
}

fn default_thumbs_bucket() -> String {
    "thumbs".to_string()
}

fn default_output_bucket() -> String {
    "output".to_string()
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            storage: default_storage_bucket(),
            thumbs: default_thumbs_bucket(),
            output: default_output_bucket(),
        }
    }
}

impl BucketConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, bucket) in [
            ("storage", &self.storage),
            ("thumbs", &self.thumbs),
            ("output", &self.output),
        ] {
            if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
                return Err(format!("buckets.{name} is not a valid bucket name: '{bucket}'"));
            }
        }
        Ok(())
    }
}

/// Downstream image server flavour.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageServerKind {
    #[default]
    Cantaloupe,
    Iip,
}

impl ImageServerKind {
    /// Name of the proxy destination serving this image server.
    pub fn destination_name(self) -> &'static str {
        match self {
            Self::Cantaloupe => "cantaloupe",
            Self::Iip => "iip",
        }
    }
}

/// Image orchestration configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Root directory of the fast local storage read by the image server.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
    /// Template for the local path of an orchestrated asset.
    /// Supports `{root}`, `{customer}`, `{space}`, `{image-dir}` and `{image}`.
    #[serde(default = "default_path_template")]
    pub path_template: String,
    /// Maximum time a request waits for orchestration, in milliseconds.
    #[serde(default = "default_critical_path_timeout_ms")]
    pub critical_path_timeout_ms: u64,
    #[serde(default)]
    pub image_server: ImageServerKind,
    /// Path appended to the image server address when proxying.
    #[serde(default = "default_image_server_path_template")]
    pub image_server_path_template: String,
}

fn default_local_root() -> PathBuf {
    PathBuf::from("./data/nas")
}

fn default_path_template() -> String {
    "{root}/{customer}/{space}/{image-dir}/{image}.jp2".to_string()
}

fn default_critical_path_timeout_ms() -> u64 {
    10_000
}

fn default_image_server_path_template() -> String {
    "/iiif/3/{customer}%2F{space}%2F{image}/".to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            local_root: default_local_root(),
            path_template: default_path_template(),
            critical_path_timeout_ms: default_critical_path_timeout_ms(),
            image_server: ImageServerKind::default(),
            image_server_path_template: default_image_server_path_template(),
        }
    }
}

impl OrchestratorConfig {
    pub fn critical_path_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.critical_path_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.path_template.contains("{image}") {
            return Err(
                "orchestrator.path_template must contain {image} to keep paths unique".to_string(),
            );
        }
        if self.critical_path_timeout_ms == 0 {
            return Err("orchestrator.critical_path_timeout_ms cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Downstream proxy configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Logical destination name ("deliverator", "thumbs", "cantaloupe", ...)
    /// mapped to the base URLs serving it.
    #[serde(default)]
    pub destinations: HashMap<String, Vec<String>>,
    /// Whether a resizing thumbnail service is available.
    #[serde(default)]
    pub can_resize_thumbs: bool,
}

/// Per-customer overrides for projections.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CustomerOverride {
    /// Asset roles that carry through to projection control files.
    #[serde(default)]
    pub roles_whitelist: Vec<String>,
}

/// Named query projection configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedQueryConfig {
    /// Seconds after which an in-process control file is considered abandoned.
    #[serde(default = "default_control_stale_secs")]
    pub control_stale_secs: u64,
    /// Scratch directory for zip archives under construction.
    #[serde(default = "default_zip_temp_dir")]
    pub zip_temp_dir: PathBuf,
    /// Base URL of the PDF rendering service.
    #[serde(default)]
    pub pdf_renderer_url: Option<String>,
    /// Overrides keyed by customer id.
    #[serde(default)]
    pub customer_overrides: HashMap<String, CustomerOverride>,
}

fn default_control_stale_secs() -> u64 {
    600 // 10 minutes
}

fn default_zip_temp_dir() -> PathBuf {
    std::env::temp_dir().join("tessera-zip")
}

impl Default for NamedQueryConfig {
    fn default() -> Self {
        Self {
            control_stale_secs: default_control_stale_secs(),
            zip_temp_dir: default_zip_temp_dir(),
            pdf_renderer_url: None,
            customer_overrides: HashMap::new(),
        }
    }
}

impl NamedQueryConfig {
    /// Roles whitelist for a customer. Customers without an override carry no roles.
    pub fn roles_whitelist(&self, customer: u32) -> &[String] {
        self.customer_overrides
            .get(&customer.to_string())
            .map(|o| o.roles_whitelist.as_slice())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.control_stale_secs > i64::MAX as u64 {
            return Err(format!(
                "named_query.control_stale_secs {} exceeds maximum value {}",
                self.control_stale_secs,
                i64::MAX
            ));
        }
        for key in self.customer_overrides.keys() {
            if key.parse::<u32>().is_err() {
                return Err(format!(
                    "named_query.customer_overrides key '{key}' is not a customer id"
                ));
            }
        }
        Ok(())
    }
}

/// Asset catalog source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CatalogConfig {
    /// Empty in-memory catalog.
    #[default]
    Memory,
    /// JSON document loaded at startup.
    File {
        path: PathBuf,
    },
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub named_query: NamedQueryConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, an in-memory catalog
    /// and no proxy destinations.
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.buckets.validate()?;
        self.orchestrator.validate()?;
        self.named_query.validate()?;
        Ok(())
    }
}
