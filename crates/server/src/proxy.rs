//! Forwarding of requests to downstream servers.

use crate::destinations::ProxyDestination;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::Response;
use futures::StreamExt;
use tessera_core::AssetId;
use tessera_core::local_path::expand_template;
use tracing::{debug, warn};

/// Streams downstream responses back to the caller.
#[derive(Clone)]
pub struct DownstreamProxy {
    client: reqwest::Client,
    image_server_path_template: String,
}

impl DownstreamProxy {
    pub fn new(image_server_path_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            image_server_path_template: image_server_path_template.into(),
        }
    }

    /// URL of an IIIF request for `asset_id` on the image server at `address`.
    pub fn image_server_url(&self, address: &str, asset_id: &AssetId, suffix: &str) -> String {
        let path = expand_template(&self.image_server_path_template, "", asset_id);
        format!("{}{path}{suffix}", address.trim_end_matches('/'))
    }

    /// GET `url` and relay status, content type and body.
    pub async fn forward(&self, url: &str, destination: ProxyDestination) -> ApiResult<Response> {
        let label = destination.to_string();
        metrics::PROXY_REQUESTS.with_label_values(&[&label]).inc();
        debug!(url, %destination, "Proxying request");

        let upstream = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::PROXY_ERRORS.with_label_values(&[&label]).inc();
                warn!(url, error = %e, "Downstream request failed");
                return Err(ApiError::from(e));
            }
        };

        let status =
            StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut builder = Response::builder().status(status);
        for name in [CONTENT_TYPE, CONTENT_LENGTH, CACHE_CONTROL] {
            if let Some(value) = upstream.headers().get(name.as_str())
                && let Ok(value) = value.to_str()
            {
                builder = builder.header(name, value);
            }
        }

        let stream = upstream
            .bytes_stream()
            .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

        builder
            .body(Body::from_stream(stream))
            .map_err(|e| ApiError::Internal(format!("failed to build proxy response: {e}")))
    }
}
