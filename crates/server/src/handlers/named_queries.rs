//! Named-query projection endpoints (zip archives and PDFs).

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use tessera_catalog::{CustomerRepo, NamedQueryRepo};
use tessera_core::{ControlFile, ParsedNamedQuery, PersistedProjectionStatus, ProjectionKind};
use tracing::debug;

/// Path parameters shared by the projection routes. `args` is absent for
/// queries called without arguments.
#[derive(Debug, Deserialize)]
pub struct NamedQueryPath {
    pub customer: String,
    pub name: String,
    #[serde(default)]
    pub args: Option<String>,
}

/// Resolve and parse the named query addressed by `path`.
async fn parse_request(
    state: &AppState,
    path: &NamedQueryPath,
    kind: ProjectionKind,
) -> ApiResult<ParsedNamedQuery> {
    let customer = state.catalog.resolve_customer(&path.customer).await?;
    let query = state
        .catalog
        .get_named_query(customer.id, &path.name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("named query {}", path.name)))?;

    let parsed = tessera_core::parse_named_query(
        customer.id,
        &query.name,
        &query.template,
        path.args.as_deref(),
        kind,
    )?;
    if parsed.faulty {
        return Err(ApiError::BadRequest(
            parsed.error_message.unwrap_or_default(),
        ));
    }
    Ok(parsed)
}

async fn projection(
    state: AppState,
    path: NamedQueryPath,
    headers: HeaderMap,
    kind: ProjectionKind,
) -> ApiResult<Response> {
    let query = parse_request(&state, &path, kind).await?;
    let projection = state
        .coordinator
        .get_projection(
            &query,
            state.creator(kind),
            &headers,
            &state.shutdown.child_token(),
        )
        .await?;
    debug!(storage_key = %query.storage_key, status = projection.status.as_str(), "Projection resolved");

    match projection.status {
        PersistedProjectionStatus::Available => {
            let Some(stream) = projection.stream else {
                return Err(ApiError::NotFound(query.storage_key));
            };
            let body = Body::from_stream(
                stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string()))),
            );
            let mut response = (StatusCode::OK, body).into_response();
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(kind.content_type()));
            if let Some(size) = projection.size {
                headers.insert(CONTENT_LENGTH, size.into());
            }
            Ok(response)
        }
        PersistedProjectionStatus::InProcess => Ok((
            StatusCode::ACCEPTED,
            [(RETRY_AFTER, state.config.named_query.control_stale_secs.to_string())],
        )
            .into_response()),
        PersistedProjectionStatus::NotFound => Err(ApiError::NotFound(format!(
            "no assets for named query {}",
            query.query_name
        ))),
        PersistedProjectionStatus::Restricted => Err(ApiError::Forbidden(format!(
            "{} requires authorization",
            query.storage_key
        ))),
        PersistedProjectionStatus::Error | PersistedProjectionStatus::Unknown => Err(
            ApiError::Build(format!("failed to build {}", query.storage_key)),
        ),
    }
}

async fn control_file(
    state: AppState,
    path: NamedQueryPath,
    kind: ProjectionKind,
) -> ApiResult<Json<ControlFile>> {
    let query = parse_request(&state, &path, kind).await?;
    state
        .coordinator
        .get_control_file(&query)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(query.control_file_key))
}

/// GET /zip/{customer}/{name}[/{*args}]
pub async fn get_zip(
    State(state): State<AppState>,
    Path(path): Path<NamedQueryPath>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    projection(state, path, headers, ProjectionKind::Zip).await
}

/// GET /pdf/{customer}/{name}[/{*args}]
pub async fn get_pdf(
    State(state): State<AppState>,
    Path(path): Path<NamedQueryPath>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    projection(state, path, headers, ProjectionKind::Pdf).await
}

/// GET /zip-control/{customer}/{name}[/{*args}]
pub async fn get_zip_control(
    State(state): State<AppState>,
    Path(path): Path<NamedQueryPath>,
) -> ApiResult<Json<ControlFile>> {
    control_file(state, path, ProjectionKind::Zip).await
}

/// GET /pdf-control/{customer}/{name}[/{*args}]
pub async fn get_pdf_control(
    State(state): State<AppState>,
    Path(path): Path<NamedQueryPath>,
) -> ApiResult<Json<ControlFile>> {
    control_file(state, path, ProjectionKind::Pdf).await
}
