//! Cache Statistics Module
//!
//! Tracks per-namespace cache performance: hits, misses, evictions and footprint.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of one namespace (or an aggregate of several).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries evicted by the eviction policy
    pub evictions: u64,
    /// Sum of entry sizes currently held
    pub current_size_bytes: usize,
    /// Current number of entries
    pub item_count: usize,
    /// hits / (hits + misses), 0 before any access
    pub hit_rate: f64,
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
    pub fn compute_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.hit_rate = self.compute_hit_rate();
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.hit_rate = self.compute_hit_rate();
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Merge ==
    /// Folds another snapshot into this one, recomputing the hit rate.
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.current_size_bytes += other.current_size_bytes;
        self.item_count += other.item_count;
        self.hit_rate = self.compute_hit_rate();
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
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        assert_eq!(stats.hit_rate, 1.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.compute_hit_rate(), 0.5);
    }

    #[test]
    fn test_record_eviction() {
        let mut stats = CacheStats::new();
        stats.record_eviction();
        stats.record_eviction();
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn test_merge() {
        let mut total = CacheStats::new();
        let mut a = CacheStats::new();
        a.record_hit();
        a.item_count = 2;
        a.current_size_bytes = 40;
        let mut b = CacheStats::new();
        b.record_miss();
        b.record_eviction();
        b.item_count = 1;
        b.current_size_bytes = 10;

        total.merge(&a);
        total.merge(&b);

        assert_eq!(total.hits, 1);
        assert_eq!(total.misses, 1);
        assert_eq!(total.evictions, 1);
        assert_eq!(total.item_count, 3);
        assert_eq!(total.current_size_bytes, 50);
        assert_eq!(total.hit_rate, 0.5);
    }
}
