//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::persistence::DEFAULT_MAX_ENTRY_BYTES;
use crate::cache::{CacheSettings, StampedeSettings};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// TTL in seconds for cached file listings
    pub default_ttl: u64,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Upper bound on one gateway call, in milliseconds
    pub fetch_timeout_ms: u64,
    /// Serve and cache an empty listing when the gateway fails
    pub fail_open: bool,
    /// TTL in seconds for fail-open entries
    pub fail_open_ttl: u64,
    /// Snapshot file; `None` keeps the cache in memory only
    pub cache_file: Option<PathBuf>,
    /// Entries at least this large are left out of the snapshot
    pub max_persisted_entry_bytes: usize,
    /// Snapshot shared with other server processes; takes precedence over `cache_file`
    pub shared_cache_file: Option<PathBuf>,
    pub stampede_poll_interval_ms: u64,
    pub stampede_max_attempts: u32,
    /// Gateway endpoint listing the caller's files
    pub files_gateway_url: String,
    /// Bearer token allowed to clear the whole cache; `None` disables clearing
    pub admin_token: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `DEFAULT_TTL` - Listing TTL in seconds (default: 3600)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `FETCH_TIMEOUT_MS` - Gateway timeout in milliseconds (default: 10000)
    /// - `FAIL_OPEN` - Cache an empty listing on gateway failure (default: true)
    /// - `FAIL_OPEN_TTL` - TTL of that empty listing in seconds (default: 30)
    /// - `CACHE_FILE` - Snapshot path (default: unset, memory only)
    /// - `MAX_PERSISTED_ENTRY_BYTES` - Snapshot entry size limit (default: 100000)
    /// - `SHARED_CACHE_FILE` - Snapshot shared across processes (default: unset)
    /// - `STAMPEDE_POLL_INTERVAL_MS` - Wait between polls (default: 200)
    /// - `STAMPEDE_MAX_ATTEMPTS` - Polls before fetching anyway (default: 10)
    /// - `FILES_GATEWAY_URL` - Listing endpoint (default: http://localhost:4000/files)
    /// - `ADMIN_TOKEN` - Operator token for clearing the cache (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: parsed("SERVER_PORT").unwrap_or(defaults.server_port),
            default_ttl: parsed("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            cleanup_interval: parsed("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
            fetch_timeout_ms: parsed("FETCH_TIMEOUT_MS").unwrap_or(defaults.fetch_timeout_ms),
            fail_open: parsed("FAIL_OPEN").unwrap_or(defaults.fail_open),
            fail_open_ttl: parsed("FAIL_OPEN_TTL").unwrap_or(defaults.fail_open_ttl),
            cache_file: non_empty("CACHE_FILE").map(PathBuf::from),
            max_persisted_entry_bytes: parsed("MAX_PERSISTED_ENTRY_BYTES")
                .unwrap_or(defaults.max_persisted_entry_bytes),
            shared_cache_file: non_empty("SHARED_CACHE_FILE").map(PathBuf::from),
            stampede_poll_interval_ms: parsed("STAMPEDE_POLL_INTERVAL_MS")
                .unwrap_or(defaults.stampede_poll_interval_ms),
            stampede_max_attempts: parsed("STAMPEDE_MAX_ATTEMPTS")
                .unwrap_or(defaults.stampede_max_attempts),
            files_gateway_url: env::var("FILES_GATEWAY_URL").unwrap_or(defaults.files_gateway_url),
            admin_token: non_empty("ADMIN_TOKEN"),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            default_ttl: Duration::from_secs(self.default_ttl),
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }

    pub fn stampede_settings(&self) -> StampedeSettings {
        StampedeSettings {
            poll_interval: Duration::from_millis(self.stampede_poll_interval_ms),
            max_attempts: self.stampede_max_attempts,
        }
    }

    /// TTL for empty listings cached after a gateway failure, if failing open.
    pub fn fail_open_ttl(&self) -> Option<Duration> {
        self.fail_open
            .then_some(Duration::from_secs(self.fail_open_ttl))
    }
}

fn parsed<V: FromStr>(name: &str) -> Option<V> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            default_ttl: 3600,
            cleanup_interval: 60,
            fetch_timeout_ms: 10_000,
            fail_open: true,
            fail_open_ttl: 30,
            cache_file: None,
            max_persisted_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            shared_cache_file: None,
            stampede_poll_interval_ms: 200,
            stampede_max_attempts: 10,
            files_gateway_url: "http://localhost:4000/files".to_string(),
            admin_token: None,
        }
    }
}
