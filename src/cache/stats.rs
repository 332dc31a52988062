//! Cache Statistics Module
//!
//! Tracks hits, misses, coalesced waits and upstream fetch outcomes.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from a live entry
    pub hits: u64,
    /// Lookups that found no live entry
    pub misses: u64,
    /// Callers that attached to a fetch already in flight
    pub coalesced: u64,
    /// Upstream fetches started
    pub fetches: u64,
    /// Upstream fetches that failed or timed out
    pub fetch_failures: u64,
    /// Failures answered with a cached empty result
    pub fail_open: u64,
    /// Entries removed because they expired
    pub pruned: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Fetches currently in flight
    pub in_flight: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_coalesced(&mut self) {
        self.coalesced += 1;
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    pub fn record_fetch_failure(&mut self, failed_open: bool) {
        self.fetch_failures += 1;
        if failed_open {
            self.fail_open += 1;
        }
    }

    pub fn record_pruned(&mut self, count: usize) {
        self.pruned += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_fetch_failures() {
        let mut stats = CacheStats::new();
        stats.record_fetch();
        stats.record_fetch();
        stats.record_fetch_failure(false);
        stats.record_fetch_failure(true);

        assert_eq!(stats.fetches, 2);
        assert_eq!(stats.fetch_failures, 2);
        assert_eq!(stats.fail_open, 1);
    }

    #[test]
    fn test_record_pruned() {
        let mut stats = CacheStats::new();
        stats.record_pruned(3);
        stats.record_pruned(2);
        assert_eq!(stats.pruned, 5);
    }
}
