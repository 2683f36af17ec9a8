//! Tessera delivery server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tessera_core::config::AppConfig;
use tessera_server::{AppState, OpenContentOnly, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tessera - an IIIF image and asset delivery server
#[derive(Parser, Debug)]
#[command(name = "tesserad")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "TESSERA_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Tessera v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; TESSERA_ variables can provide or override everything
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(config_path = %args.config, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TESSERA_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    tessera_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = tessera_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    for bucket in [
        &config.buckets.storage,
        &config.buckets.thumbs,
        &config.buckets.output,
    ] {
        storage
            .health_check(bucket)
            .await
            .with_context(|| format!("storage health check failed for bucket {bucket}"))?;
    }
    tracing::info!(backend = storage.backend_name(), "Storage backend connectivity verified");

    let catalog = tessera_catalog::from_config(&config.catalog)
        .await
        .context("failed to initialize catalog")?;
    tracing::info!("Catalog initialized");

    tokio::fs::create_dir_all(&config.orchestrator.local_root)
        .await
        .with_context(|| {
            format!(
                "failed to create fast storage root {}",
                config.orchestrator.local_root.display()
            )
        })?;

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, catalog, Arc::new(OpenContentOnly))
        .context("failed to create application state")?;
    let shutdown = state.shutdown.clone();
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
            // Stops in-flight orchestrations and projection builds
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
