//! Route configuration.

use crate::handlers;
use crate::metrics::{metrics_handler, register_metrics};
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use picstore_core::config::CorsConfig;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/upload", post(handlers::upload_image))
        .route("/upload/{scope}", post(handlers::upload_scoped_image))
        .route("/images/{scope}/{file}", get(handlers::get_image))
        .route("/health", get(handlers::health_check));

    if state.config.server.metrics_enabled {
        register_metrics();
        router = router.route("/metrics", get(metrics_handler));
    }

    let mut router = router
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size));

    if let Some(cors) = cors_layer(&state.config.server.cors) {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Build the CORS layer, or `None` when CORS is disabled.
fn cors_layer(config: &CorsConfig) -> Option<CorsLayer> {
    if !config.enabled {
        return None;
    }

    let origins = if config.allows_any_origin() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any),
    )
}
