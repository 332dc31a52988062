//! Request DTOs for the cache server API
//!
//! Defines the query parameters accepted by the listing endpoints.

use serde::Deserialize;

/// Query string of `GET /api/files` and the session listing.
///
/// `refresh=true` bypasses a live cache entry. A fetch already in flight is
/// still shared.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilesQuery {
    #[serde(default)]
    pub refresh: bool,
}
