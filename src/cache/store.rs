//! Cache Store Module
//!
//! Key to entry map with lazy TTL expiry. Every mutation is written through to the
//! configured [`Persistence`]; persistence failures degrade to memory-only
//! operation and never fail the mutation.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::persistence::{Persistence, Snapshot};
use crate::cache::{CacheEntry, CacheKey, CacheStats, Clock};

// == Cache Store ==
pub struct CacheStore<T> {
    /// Key-value storage
    entries: Snapshot<T>,
    /// Durable medium written after each mutation
    persistence: Arc<dyn Persistence<T>>,
    clock: Arc<dyn Clock>,
    /// Performance statistics
    stats: CacheStats,
}

impl<T: Clone> CacheStore<T> {
    // == Constructor ==
    /// Creates a store seeded from whatever `persistence` still holds live.
    pub fn new(persistence: Arc<dyn Persistence<T>>, clock: Arc<dyn Clock>) -> Self {
        let entries = persistence.load(clock.now_ms());
        if !entries.is_empty() {
            info!("Restored {} cache entries from snapshot", entries.len());
        }

        let mut stats = CacheStats::new();
        stats.set_total_entries(entries.len());

        Self {
            entries,
            persistence,
            clock,
            stats,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Get ==
    /// Returns the entry for `key` if it is still live.
    ///
    /// Expired entries are reported as absent and left for [`prune_expired`](Self::prune_expired).
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let now = self.clock.now_ms();
        match self.entries.get(key.as_str()) {
            Some(entry) if entry.is_live(now) => {
                self.stats.record_hit();
                Some(entry.clone())
            }
            _ => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Like [`get`](Self::get) but leaves the statistics untouched.
    pub fn peek(&self, key: &CacheKey) -> Option<&CacheEntry<T>> {
        let now = self.clock.now_ms();
        self.entries
            .get(key.as_str())
            .filter(|entry| entry.is_live(now))
    }

    // == Set ==
    /// Creates or replaces the entry for `key`.
    pub fn set(&mut self, key: &CacheKey, value: T, ttl: Duration) -> CacheEntry<T> {
        let entry = CacheEntry::new(value, ttl, self.clock.now_ms());
        self.entries.insert(key.as_str().to_owned(), entry.clone());
        self.persist();
        entry
    }

    // == Invalidate ==
    /// Removes `key`. Returns whether an entry was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key.as_str()).is_some();
        if removed {
            debug!(key = %key, "invalidated cache entry");
            self.persist();
        }
        removed
    }

    /// Removes every key starting with `prefix`. Returns the number removed.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(prefix, removed, "invalidated cache entries by prefix");
            self.persist();
        }
        removed
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    // == Prune Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub fn prune_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.stats.record_pruned(removed);
            self.persist();
        }
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for pending snapshot writes to land.
    pub fn flush(&self) {
        self.persistence.flush();
    }

    fn persist(&mut self) {
        self.stats.set_total_entries(self.entries.len());
        if let Err(err) = self.persistence.save(&self.entries) {
            warn!(error = %err, "failed to persist cache snapshot; continuing in memory");
        }
    }
}
