//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;

    // Image and thumb prefixes are configurable, so the whole remainder is
    // captured and handed to the path parser.
    let delivery_routes = Router::new()
        .route(
            &format!("/{}/{{*path}}", server.image_path),
            get(handlers::get_image),
        )
        .route(
            &format!("/{}/{{*path}}", server.thumbs_path),
            get(handlers::get_thumb),
        );

    let projection_routes = Router::new()
        .route("/zip/{customer}/{name}", get(handlers::get_zip))
        .route("/zip/{customer}/{name}/{*args}", get(handlers::get_zip))
        .route("/pdf/{customer}/{name}", get(handlers::get_pdf))
        .route("/pdf/{customer}/{name}/{*args}", get(handlers::get_pdf))
        .route(
            "/zip-control/{customer}/{name}",
            get(handlers::get_zip_control),
        )
        .route(
            "/zip-control/{customer}/{name}/{*args}",
            get(handlers::get_zip_control),
        )
        .route(
            "/pdf-control/{customer}/{name}",
            get(handlers::get_pdf_control),
        )
        .route(
            "/pdf-control/{customer}/{name}/{*args}",
            get(handlers::get_pdf_control),
        );

    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(delivery_routes)
        .merge(projection_routes);

    // When enabled, this endpoint must be network-restricted to the
    // Prometheus scrapers.
    if server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
