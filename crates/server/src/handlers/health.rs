//! Health endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.catalog.health_check().await?;
    state
        .storage
        .health_check(&state.config.buckets.output)
        .await?;

    Ok(Json(HealthResponse {
        status: "ok",
        backend: state.storage.backend_name(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}
