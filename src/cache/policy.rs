//! Eviction Policy Module
//!
//! Selects which key leaves a namespace when it runs out of budget.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::{FifoTracker, LfuTracker, LruTracker};

// == Eviction Policy ==
/// Eviction strategy, chosen per namespace when the namespace is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used
    Lfu,
    /// First in, first out
    Fifo,
}

impl EvictionPolicy {
    /// Builds an empty tracker implementing this policy.
    pub fn tracker(self) -> Box<dyn EvictionTracker> {
        match self {
            EvictionPolicy::Lru => Box::new(LruTracker::new()),
            EvictionPolicy::Lfu => Box::new(LfuTracker::new()),
            EvictionPolicy::Fifo => Box::new(FifoTracker::new()),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            other => Err(format!("unknown eviction policy: {other}")),
        }
    }
}

// == Eviction Tracker ==
/// Bookkeeping a namespace keeps alongside its entries to pick eviction victims.
pub trait EvictionTracker: Send + fmt::Debug {
    /// A key was written for the first time.
    fn record_insert(&mut self, key: &str);

    /// An existing key was overwritten.
    fn record_update(&mut self, key: &str);

    /// A key was read successfully.
    fn record_access(&mut self, key: &str);

    /// Forgets a key (delete or expiry).
    fn remove(&mut self, key: &str);

    /// Removes and returns the next victim, if any.
    fn evict(&mut self) -> Option<String>;

    /// Whether the key is tracked.
    fn contains(&self, key: &str) -> bool;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_str() {
        assert_eq!("lru".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Lru));
        assert_eq!(" LFU ".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Lfu));
        assert_eq!("Fifo".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Fifo));
        assert!("random".parse::<EvictionPolicy>().is_err());
    }

    #[test]
    fn test_policy_builds_matching_tracker() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo] {
            let mut tracker = policy.tracker();
            tracker.record_insert("a");
            assert!(tracker.contains("a"));
            assert_eq!(tracker.evict(), Some("a".to_string()));
            assert!(tracker.is_empty());
        }
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&EvictionPolicy::Fifo).unwrap();
        assert_eq!(json, "\"fifo\"");
        let policy: EvictionPolicy = serde_json::from_str("\"lfu\"").unwrap();
        assert_eq!(policy, EvictionPolicy::Lfu);
    }
}
