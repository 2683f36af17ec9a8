//! IIIF image endpoints.

use crate::destinations::ProxyDestination;
use crate::error::{ApiError, ApiResult};
use crate::path_parser::ImageRequest;
use crate::state::AppState;
use axum::extract::State;
use axum::http::Uri;
use axum::response::Response;
use tracing::debug;

/// Serve an IIIF image request.
///
/// The asset is orchestrated into fast storage before the request is
/// proxied to the image server, which only reads local files.
pub async fn get_image(State(state): State<AppState>, uri: Uri) -> ApiResult<Response> {
    let request = state.path_parser.parse(uri.path()).await?;
    // Validate before touching storage
    ImageRequest::parse(&request.suffix)?;

    let asset_id = request.asset_id()?;
    let asset = state.orchestrator.deliverable_asset(&asset_id).await?;
    state
        .orchestrator
        .orchestrate_image(&asset, None, &state.shutdown.child_token())
        .await?;

    let Some(address) = state.destinations.resolve(ProxyDestination::ImageServer) else {
        return Err(ApiError::Upstream("no image server configured".to_string()));
    };
    let url = state
        .proxy
        .image_server_url(address, &asset_id, &request.suffix);
    debug!(asset_id = %asset_id, url = %url, "Forwarding to image server");
    state.proxy.forward(&url, ProxyDestination::ImageServer).await
}
