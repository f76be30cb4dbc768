//! Coordinator Statistics Module
//!
//! Tracks how reads were answered and how much upstream work they caused.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Coordinator Stats ==
/// Lock-free counters shared by every read.
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    hits: AtomicU64,
    not_modified: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    stale_fallbacks: AtomicU64,
    rate_limited: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Reads answered with the cached payload
    pub hits: u64,
    /// Reads answered with "not modified"
    pub not_modified: u64,
    /// Reads that needed a fetch
    pub misses: u64,
    /// Successful upstream fetches
    pub fetches: u64,
    /// Reads that attached to another caller's fetch
    pub coalesced: u64,
    /// Reads answered from a stale entry after a failed or refused fetch
    pub stale_fallbacks: u64,
    /// Fetches refused by the rate limiter
    pub rate_limited: u64,
    /// Reads that ended without data
    pub errors: u64,
    /// (hits + not_modified) / all reads
    pub hit_rate: f64,
}

impl CoordinatorStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_modified(&self) {
        self.not_modified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_fallback(&self) {
        self.stale_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> StatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let not_modified = self.not_modified.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        let served = hits + not_modified;
        let total = served + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        };

        StatsSnapshot {
            hits,
            not_modified,
            misses,
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CoordinatorStats::new().snapshot();
        assert_eq!(stats, StatsSnapshot::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CoordinatorStats::new().snapshot().hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_counts_not_modified_as_served() {
        let stats = CoordinatorStats::new();
        stats.record_hit();
        stats.record_not_modified();
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.snapshot().hit_rate, 0.5);
    }

    #[test]
    fn test_counters_accumulate() {
        let stats = CoordinatorStats::new();
        stats.record_fetch();
        stats.record_fetch();
        stats.record_coalesced();
        stats.record_stale_fallback();
        stats.record_rate_limited();
        stats.record_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.fetches, 2);
        assert_eq!(snapshot.coalesced, 1);
        assert_eq!(snapshot.stale_fallbacks, 1);
        assert_eq!(snapshot.rate_limited, 1);
        assert_eq!(snapshot.errors, 1);
    }
}
