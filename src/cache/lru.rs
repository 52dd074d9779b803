//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::VecDeque;

use crate::cache::EvictionTracker;

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Order of keys by access time
    order: VecDeque<String>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    pub fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_front(key.to_string());
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.back()
    }
}

impl EvictionTracker for LruTracker {
    fn record_insert(&mut self, key: &str) {
        self.touch(key);
    }

    fn record_update(&mut self, key: &str) {
        self.touch(key);
    }

    fn record_access(&mut self, key: &str) {
        self.touch(key);
    }

    fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    fn evict(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_lru_insert_order() {
        let mut lru = LruTracker::new();

        lru.record_insert("key1");
        lru.record_insert("key2");
        lru.record_insert("key3");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"key1".to_string()));
    }

    #[test]
    fn test_lru_access_moves_to_front() {
        let mut lru = LruTracker::new();

        lru.record_insert("a");
        lru.record_insert("b");
        lru.record_insert("c");
        lru.record_access("a");

        assert_eq!(lru.evict(), Some("b".to_string()));
        assert_eq!(lru.evict(), Some("c".to_string()));
        assert_eq!(lru.evict(), Some("a".to_string()));
        assert_eq!(lru.evict(), None);
    }

    #[test]
    fn test_lru_update_counts_as_use() {
        let mut lru = LruTracker::new();

        lru.record_insert("a");
        lru.record_insert("b");
        lru.record_update("a");

        assert_eq!(lru.peek_oldest(), Some(&"b".to_string()));
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();

        lru.record_insert("key1");
        lru.record_insert("key2");
        lru.record_insert("key3");
        lru.remove("key2");
        lru.remove("nonexistent");

        assert_eq!(lru.len(), 2);
        assert!(!lru.contains("key2"));
        assert!(lru.contains("key1"));
        assert!(lru.contains("key3"));
    }

    #[test]
    fn test_lru_touch_same_key_multiple_times() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key1");
        lru.touch("key1");

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.evict(), Some("key1".to_string()));
        assert!(lru.is_empty());
    }
}
