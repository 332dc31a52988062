//! API Module
//!
//! HTTP handlers and routing for the document listing cache.
//!
//! # Endpoints
//! - `GET /api/files` - The caller's file listing
//! - `GET /api/sessions/:session_id/files` - One session's files
//! - `DELETE /api/cache` - Clear the cache (operator token only)
//! - `DELETE /api/cache/me` - Invalidate the caller's listings
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::Caller;
pub use handlers::*;
pub use routes::create_router;
