//! Cache Statistics Module
//!
//! Tracks per-partition metrics: hits, misses, expirations, evictions and
//! storage usage.

use serde::Serialize;

// == Cache Stats ==
/// Counters for one cache partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Requests served from a fresh entry
    pub hits: u64,
    /// Requests that found no entry or only a stale one
    pub misses: u64,
    /// Pairs removed because they were idle past the age limit
    pub expirations: u64,
    /// Pairs removed because the partition exceeded its entry limit
    pub evictions: u64,
    /// Writes rejected by the storage quota
    pub rejected_writes: u64,
    /// Current number of entries in the partition
    pub total_entries: usize,
    /// Current body bytes held by the partition
    pub stored_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
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

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_rejected_write(&mut self) {
        self.rejected_writes += 1;
    }

    // == Update Usage ==
    /// Updates the entry count and byte usage.
    pub fn set_usage(&mut self, total_entries: usize, stored_bytes: usize) {
        self.total_entries = total_entries;
        self.stored_bytes = stored_bytes;
    }
}
