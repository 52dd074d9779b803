//! FIFO Tracker Module
//!
//! Evicts strictly by insertion order; reads and overwrites do not reorder.

use std::collections::VecDeque;

use crate::cache::EvictionTracker;

// == FIFO Tracker ==
#[derive(Debug, Default)]
pub struct FifoTracker {
    /// Front = oldest insertion
    order: VecDeque<String>,
}

impl FifoTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionTracker for FifoTracker {
    fn record_insert(&mut self, key: &str) {
        if !self.contains(key) {
            self.order.push_back(key.to_string());
        }
    }

    fn record_update(&mut self, key: &str) {
        self.record_insert(key);
    }

    fn record_access(&mut self, _key: &str) {}

    fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    fn evict(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}
