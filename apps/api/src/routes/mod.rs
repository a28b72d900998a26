pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::cover_letter::handlers;
use crate::state::AppState;

/// Builds the full application router.
///
/// `CorsLayer` sits outermost and answers every `OPTIONS` request itself (200 with
/// permissive allow headers), whatever the path, so no route declares OPTIONS.
pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/process-data",
            post(handlers::handle_process_data).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
