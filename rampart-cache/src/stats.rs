//! Cache statistics.
//!
//! Counters are mutated only by the cache tiers; callers receive a
//! [`CacheStats`] snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time statistics for a multi-tier cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered by the local tier.
    pub l1_hits: u64,
    /// Reads answered by the remote tier (and promoted).
    pub l2_hits: u64,
    /// Reads answered by neither tier.
    pub misses: u64,
    /// Writes accepted, whether or not the remote tier took them.
    pub sets: u64,
    /// Entries currently held by the local tier.
    pub l1_entries: u64,
    /// Local entries dropped to make room.
    pub l1_evictions: u64,
    /// Local entries dropped because their TTL elapsed.
    pub l1_expirations: u64,
    /// Remote calls that failed, timed out, or could not be decoded.
    pub l2_errors: u64,
    /// Whether the remote tier is configured and connected.
    pub l2_available: bool,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0) across both tiers.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.l1_hits + self.l2_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Monotonic read/write counters shared by the cache front end.
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the read/write counters; tier gauges are filled in by the caller.
    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.l2_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}
