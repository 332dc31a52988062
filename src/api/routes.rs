//! API Routes
//!
//! Configures the Axum router with all cache server endpoints.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_cache_handler, files_handler, health_handler, invalidate_own_handler,
    session_files_handler, stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /api/files` - The caller's file listing, cached per bearer token
/// - `GET /api/sessions/:session_id/files` - One session's files from that listing
/// - `DELETE /api/cache` - Drop every cached listing (operator token only)
/// - `DELETE /api/cache/me` - Drop the caller's cached listings
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/files", get(files_handler))
        .route("/api/sessions/:session_id/files", get(session_files_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route("/api/cache/me", delete(invalidate_own_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
