//! Namespace Store Module
//!
//! One namespace of the local cache: HashMap storage, a pluggable eviction
//! tracker, a byte and entry budget, and its own statistics.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::entry::approximate_size;
use crate::cache::{CacheEntry, CacheStats, EvictionPolicy, EvictionTracker, MAX_KEY_LENGTH};
use crate::error::{CacheError, Result};

// == Namespace Config ==
/// Policy and budget of a single namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    /// Eviction strategy
    pub policy: EvictionPolicy,
    /// Maximum sum of entry sizes
    pub max_size_bytes: usize,
    /// Maximum number of entries
    pub max_entries: usize,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            policy: EvictionPolicy::Lru,
            max_size_bytes: 50 * 1024 * 1024,
            max_entries: 10_000,
        }
    }
}

// == Namespace Store ==
/// Storage for one namespace.
#[derive(Debug)]
pub struct NamespaceStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Eviction bookkeeping for the configured policy
    tracker: Box<dyn EvictionTracker>,
    /// Performance statistics
    stats: CacheStats,
    /// Policy and budget
    config: NamespaceConfig,
    /// TTL for entries written without an explicit one
    default_ttl: Duration,
}

impl<V> NamespaceStore<V> {
    // == Constructor ==
    /// Creates an empty namespace.
    pub fn new(config: NamespaceConfig, default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            tracker: config.policy.tracker(),
            stats: CacheStats::new(),
            config,
            default_ttl,
        }
    }

    /// The namespace's policy and budget.
    pub fn config(&self) -> NamespaceConfig {
        self.config
    }

    // == Set ==
    /// Stores a key-value pair, evicting per policy until it fits.
    ///
    /// If the key already exists its old size is released first and the
    /// tracker sees an update rather than an insert.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (uses the namespace default if None)
    pub fn set(&mut self, key: String, value: V, ttl: Option<Duration>) -> Result<()>
    where
        V: Serialize,
    {
        validate_key(&key)?;

        let size = approximate_size(&key, &value);
        if size > self.config.max_size_bytes {
            return Err(CacheError::EntryTooLarge {
                size,
                max: self.config.max_size_bytes,
            });
        }

        if self.config.max_entries == 0 {
            return Err(CacheError::InvalidRequest(
                "Namespace entry budget is zero".to_string(),
            ));
        }

        let replaced = self.entries.remove(&key);
        if let Some(old) = &replaced {
            self.stats.current_size_bytes -= old.size_bytes;
        }

        while self.stats.current_size_bytes + size > self.config.max_size_bytes
            || self.entries.len() >= self.config.max_entries
        {
            match self.tracker.evict() {
                Some(victim) => {
                    // The key being replaced may come up as a victim; its entry is already gone.
                    if let Some(evicted) = self.entries.remove(&victim) {
                        self.stats.current_size_bytes -= evicted.size_bytes;
                        self.stats.record_eviction();
                    }
                }
                None => {
                    if let Some(old) = replaced {
                        self.stats.current_size_bytes += old.size_bytes;
                        self.entries.insert(key.clone(), old);
                        if !self.tracker.contains(&key) {
                            self.tracker.record_insert(&key);
                        }
                    }
                    self.stats.item_count = self.entries.len();
                    return Err(CacheError::Internal(
                        "namespace over budget with nothing left to evict".to_string(),
                    ));
                }
            }
        }

        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries
            .insert(key.clone(), CacheEntry::new(value, ttl, size));
        self.stats.current_size_bytes += size;

        if self.tracker.contains(&key) {
            self.tracker.record_update(&key);
        } else {
            self.tracker.record_insert(&key);
        }

        self.stats.item_count = self.entries.len();
        Ok(())
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let expired = match self.entries.get_mut(key) {
            None => {
                self.stats.record_miss();
                return None;
            }
            Some(entry) if entry.is_expired() => true,
            Some(entry) => {
                entry.record_hit();
                let value = entry.value.clone();
                self.tracker.record_access(key);
                self.stats.record_hit();
                return Some(value);
            }
        };

        if expired {
            self.remove_entry(key);
        }
        self.stats.record_miss();
        None
    }

    // == Contains ==
    /// Whether a live entry exists. Does not touch statistics or recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Read-only view of an entry's metadata.
    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    // == Stats ==
    /// Returns current namespace statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.item_count = self.entries.len();
        stats.hit_rate = stats.compute_hit_rate();
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        expired_keys.len()
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.tracker.remove(key);
                self.stats.current_size_bytes -= entry.size_bytes;
                self.stats.item_count = self.entries.len();
                true
            }
            None => false,
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidRequest(
            "Key cannot be empty".to_string(),
        ));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidRequest(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}
