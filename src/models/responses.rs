//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::{CacheStats, Fetched, Source};
use crate::gateway::{filter_session_files, FileItem, FileListing};

/// Response body for the file listing (GET /api/files)
#[derive(Debug, Clone, Serialize)]
pub struct FilesResponse {
    pub success: bool,
    #[serde(rename = "Items")]
    pub items: Vec<FileItem>,
    /// Where the listing came from, e.g. `cache` or `cache_after_wait`
    pub source: Source,
    /// Seconds since the listing was fetched from the gateway
    pub cache_age_seconds: u64,
}

impl FilesResponse {
    pub fn new(fetched: Fetched<FileListing>, cache_age_seconds: u64) -> Self {
        Self {
            success: true,
            items: fetched.value.items,
            source: fetched.source,
            cache_age_seconds,
        }
    }
}

/// Response body for one session's files (GET /api/sessions/:session_id/files)
#[derive(Debug, Clone, Serialize)]
pub struct SessionFilesResponse {
    pub success: bool,
    pub session_id: String,
    #[serde(rename = "Items")]
    pub items: Vec<FileItem>,
    pub source: Source,
    pub cache_age_seconds: u64,
}

impl SessionFilesResponse {
    pub fn new(
        session_id: impl Into<String>,
        fetched: &Fetched<FileListing>,
        cache_age_seconds: u64,
    ) -> Self {
        let session_id = session_id.into();
        Self {
            success: true,
            items: filter_session_files(&fetched.value.items, &session_id),
            session_id,
            source: fetched.source,
            cache_age_seconds,
        }
    }
}

/// Response body for the invalidation endpoints (DELETE /api/cache...)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub success: bool,
    pub message: String,
    /// Number of entries dropped
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn cleared(removed: usize) -> Self {
        Self {
            success: true,
            message: "Cache cleared".to_string(),
            removed,
        }
    }

    pub fn own(removed: usize) -> Self {
        Self {
            success: true,
            message: "Cached listings for this caller invalidated".to_string(),
            removed,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache statistics
    pub fn new(stats: CacheStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self { stats, hit_rate }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
