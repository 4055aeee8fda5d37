//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and reaps.

use serde::{Deserialize, Serialize};

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found, expired or corrupt)
    pub misses: u64,
    /// Number of live entries removed to satisfy the memory limit
    pub evictions: u64,
    /// Number of expired entries reaped
    pub expirations: u64,
    /// Number of stored records that failed to decode
    pub corrupt_entries: u64,
    /// Entries physically stored, expired ones included
    pub total_entries: usize,
    /// Distinct tags attached to stored entries
    pub tag_count: usize,
    /// Current memory usage in bytes
    pub memory_used: u64,
    /// Configured memory limit in bytes
    pub memory_limit: Option<u64>,
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

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_corrupt(&mut self) {
        self.corrupt_entries += 1;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.expirations, 0);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.tag_count, 0);
        assert_eq!(stats.memory_limit, None);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        assert_eq!(CacheStats::new().hit_rate(), 0.0);
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
    fn test_record_counters() {
        let mut stats = CacheStats::new();
        stats.record_eviction();
        stats.record_eviction();
        stats.record_expiration();
        stats.record_corrupt();

        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.corrupt_entries, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        let json = serde_json::to_value(&stats).unwrap();

        assert_eq!(json["hits"], 1);
        assert!(json["memory_limit"].is_null());
    }
}
