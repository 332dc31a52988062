//! Expiry Cleanup Task
//!
//! Background task that periodically prunes expired cache entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Cache, CacheValue};

/// Spawns a background task that prunes expired entries every `interval`.
///
/// Pruning rewrites the snapshot when anything was removed. The returned
/// handle is aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = Cache::in_memory(CacheSettings::default());
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task<T: CacheValue>(cache: Cache<T>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "starting expiry cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.prune_expired();
            if removed > 0 {
                info!(removed, remaining = cache.len(), "pruned expired cache entries");
            } else {
                debug!("expiry cleanup: nothing to prune");
            }
        }
    })
}
