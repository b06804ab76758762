//! Router construction and HTTP middleware stack.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::progress;
use crate::state::AppState;

/// Per-request body cap; individual chunks should stay well below this.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/media/upload-start", post(handlers::upload::upload_start))
        .route("/api/v1/media/upload-chunk", post(handlers::upload::upload_chunk))
        .route(
            "/api/v1/media/upload-complete",
            post(handlers::upload::upload_complete),
        )
        .route("/api/v1/media/confirm", post(handlers::media::confirm_files))
        .route("/api/v1/media/release", post(handlers::media::release_file))
        .route("/api/v1/media/progress", get(progress::progress_ws))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let list: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(list)
        .allow_methods(Any)
        .allow_headers(Any)
}
