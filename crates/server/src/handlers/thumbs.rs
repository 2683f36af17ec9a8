//! Thumbnail endpoints.
//!
//! Thumbnails are pre-generated into the thumbs bucket, so these requests
//! never orchestrate.

use crate::destinations::ProxyDestination;
use crate::error::{ApiError, ApiResult};
use crate::path_parser::ImageRequest;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::Uri;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tessera_storage::ObjectInBucket;
use tracing::debug;

pub async fn get_thumb(State(state): State<AppState>, uri: Uri) -> ApiResult<Response> {
    let request = state.path_parser.parse(uri.path()).await?;
    let image = ImageRequest::parse(&request.suffix)?;

    if let Some(address) = state.destinations.resolve(ProxyDestination::Thumbs) {
        let url = format!(
            "{}{}",
            address.trim_end_matches('/'),
            request.normalised_full_path
        );
        return state.proxy.forward(&url, ProxyDestination::Thumbs).await;
    }

    let asset_id = request.asset_id()?;
    let object = ObjectInBucket::new(
        &state.config.buckets.thumbs,
        asset_id.thumbnail_key(&request.suffix),
    );
    debug!(object = %object, "Serving thumbnail from storage");

    let Some(meta) = state.storage.head(&object).await? else {
        // Sizes that were never pre-generated can be rendered on demand
        if state.config.proxy.can_resize_thumbs
            && let Some(address) = state.destinations.resolve(ProxyDestination::ResizeThumbs)
        {
            let url = format!("{}{}", address.trim_end_matches('/'), request.normalised_full_path);
            return state.proxy.forward(&url, ProxyDestination::ResizeThumbs).await;
        }
        return Err(ApiError::NotFound(format!("thumbnail {}", request.asset_path)));
    };
    let stream = state
        .storage
        .get_stream(&object)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("thumbnail {}", request.asset_path)))?;

    let body = Body::from_stream(
        stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string()))),
    );
    Ok((
        [
            (CONTENT_TYPE, image.content_type().to_string()),
            (CONTENT_LENGTH, meta.size.to_string()),
        ],
        body,
    )
        .into_response())
}
