//! LFU Tracker Module
//!
//! Least Frequently Used tracking. Ties go to the key inserted first.

use std::collections::{HashMap, VecDeque};

use crate::cache::EvictionTracker;

// == LFU Tracker ==
#[derive(Debug, Default)]
pub struct LfuTracker {
    /// Cumulative hit count per key
    counts: HashMap<String, u64>,
    /// Insertion order, used to break ties
    order: VecDeque<String>,
}

impl LfuTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit count recorded for a key.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }
}

impl EvictionTracker for LfuTracker {
    fn record_insert(&mut self, key: &str) {
        if self.counts.insert(key.to_string(), 0).is_none() {
            self.order.push_back(key.to_string());
        }
    }

    // Overwrites keep the accumulated count.
    fn record_update(&mut self, key: &str) {
        if !self.counts.contains_key(key) {
            self.record_insert(key);
        }
    }

    fn record_access(&mut self, key: &str) {
        if let Some(count) = self.counts.get_mut(key) {
            *count += 1;
        }
    }

    fn remove(&mut self, key: &str) {
        if self.counts.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    fn evict(&mut self) -> Option<String> {
        let mut victim: Option<(usize, u64)> = None;
        for (idx, key) in self.order.iter().enumerate() {
            let count = self.counts.get(key).copied().unwrap_or(0);
            match victim {
                Some((_, lowest)) if count >= lowest => {}
                _ => victim = Some((idx, count)),
            }
        }

        let (idx, _) = victim?;
        let key = self.order.remove(idx)?;
        self.counts.remove(&key);
        Some(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfu_evicts_least_hit() {
        let mut lfu = LfuTracker::new();
        lfu.record_insert("a");
        lfu.record_insert("b");
        lfu.record_insert("c");

        lfu.record_access("a");
        lfu.record_access("a");
        lfu.record_access("c");

        assert_eq!(lfu.evict(), Some("b".to_string()));
        assert_eq!(lfu.evict(), Some("c".to_string()));
        assert_eq!(lfu.evict(), Some("a".to_string()));
        assert_eq!(lfu.evict(), None);
    }

    #[test]
    fn test_lfu_ties_break_by_insertion_order() {
        let mut lfu = LfuTracker::new();
        lfu.record_insert("x");
        lfu.record_insert("y");
        lfu.record_access("x");
        lfu.record_access("y");

        assert_eq!(lfu.evict(), Some("x".to_string()));
    }

    #[test]
    fn test_lfu_counts_survive_other_evictions_and_updates() {
        let mut lfu = LfuTracker::new();
        lfu.record_insert("hot");
        lfu.record_insert("cold");
        for _ in 0..5 {
            lfu.record_access("hot");
        }

        assert_eq!(lfu.evict(), Some("cold".to_string()));
        lfu.record_update("hot");
        assert_eq!(lfu.count("hot"), Some(5));

        lfu.record_insert("new");
        assert_eq!(lfu.evict(), Some("new".to_string()));
    }

    #[test]
    fn test_lfu_remove() {
        let mut lfu = LfuTracker::new();
        lfu.record_insert("a");
        lfu.record_insert("b");
        lfu.remove("a");

        assert!(!lfu.contains("a"));
        assert_eq!(lfu.len(), 1);
        assert_eq!(lfu.evict(), Some("b".to_string()));
    }
}
