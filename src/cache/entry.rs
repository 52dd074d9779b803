//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access metadata.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Time to live in milliseconds
    pub ttl_ms: u64,
    /// Number of successful reads
    pub hit_count: u64,
    /// Last read or write timestamp (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Approximate footprint of key + value in bytes
    pub size_bytes: usize,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - How long the entry stays readable
    /// * `size_bytes` - Approximate size, see [`approximate_size`]
    pub fn new(value: V, ttl: Duration, size_bytes: usize) -> Self {
        let now = current_timestamp_ms();

        Self {
            value,
            created_at: now,
            ttl_ms: ttl.as_millis() as u64,
            hit_count: 0,
            last_accessed_at: now,
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once strictly more than `ttl_ms` has elapsed since
    /// creation; at exactly `created_at + ttl_ms` it is still readable.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as [`is_expired`](Self::is_expired) against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) > self.ttl_ms
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        let age = current_timestamp_ms().saturating_sub(self.created_at);
        self.ttl_ms.saturating_sub(age)
    }

    // == Record Hit ==
    /// Bumps the hit counter and access time.
    pub fn record_hit(&mut self) {
        self.hit_count += 1;
        self.last_accessed_at = current_timestamp_ms();
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Approximates the memory footprint of an entry as key bytes plus the
/// length of the value's JSON encoding.
pub fn approximate_size<V: Serialize>(key: &str, value: &V) -> usize {
    let value_size = serde_json::to_vec(value)
        .map(|encoded| encoded.len())
        .unwrap_or_else(|_| std::mem::size_of::<V>());
    key.len() + value_size
}
