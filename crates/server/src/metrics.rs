//! Prometheus metrics for the tessera server.
//!
//! Covers image orchestration, projection builds and proxied requests.
//!
//! The `/metrics` endpoint is unauthenticated and should only be reachable
//! from the Prometheus scraper's network.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Orchestration metrics
pub static ORCHESTRATIONS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tessera_orchestrations_started_total",
        "Total number of orchestrations that took the asset lock and copied data",
    )
    .expect("metric creation failed")
});

pub static ORCHESTRATIONS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tessera_orchestrations_completed_total",
        "Total number of assets successfully copied to fast storage",
    )
    .expect("metric creation failed")
});

pub static ORCHESTRATIONS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tessera_orchestrations_failed_total",
            "Total number of failed orchestrations by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static ORCHESTRATION_IN_FLIGHT_OBSERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tessera_orchestration_in_flight_observed_total",
        "Total number of requests that found an orchestration already running",
    )
    .expect("metric creation failed")
});

pub static ORCHESTRATED_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "tessera_orchestrated_bytes_total",
        "Total bytes copied from blob storage to fast storage",
    )
    .expect("metric creation failed")
});

pub static ORCHESTRATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "tessera_orchestration_duration_seconds",
            "Time spent copying an asset into fast storage",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

// Projection metrics
pub static PROJECTION_BUILDS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tessera_projection_builds_total",
            "Projection builds by kind and outcome (started, succeeded, failed)",
        ),
        &["kind", "outcome"],
    )
    .expect("metric creation failed")
});

pub static PROJECTION_RESULTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tessera_projection_results_total",
            "Projection requests by kind and resulting status",
        ),
        &["kind", "status"],
    )
    .expect("metric creation failed")
});

pub static PROJECTION_BUILD_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tessera_projection_build_duration_seconds",
            "Projection build duration by kind",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0]),
        &["kind"],
    )
    .expect("metric creation failed")
});

// Proxy metrics
pub static PROXY_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tessera_proxy_requests_total",
            "Requests forwarded downstream by destination",
        ),
        &["destination"],
    )
    .expect("metric creation failed")
});

pub static PROXY_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tessera_proxy_errors_total",
            "Downstream requests that failed before a response was received",
        ),
        &["destination"],
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so integration tests can build several routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(ORCHESTRATIONS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORCHESTRATIONS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORCHESTRATIONS_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORCHESTRATION_IN_FLIGHT_OBSERVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORCHESTRATED_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORCHESTRATION_DURATION.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(PROJECTION_BUILDS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROJECTION_RESULTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROJECTION_BUILD_DURATION.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(PROXY_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROXY_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a failed orchestration.
pub fn record_orchestration_failure(reason: &str) {
    ORCHESTRATIONS_FAILED.with_label_values(&[reason]).inc();
}

/// Record a projection build stage.
pub fn record_projection_build(kind: &str, outcome: &str) {
    PROJECTION_BUILDS.with_label_values(&[kind, outcome]).inc();
}
