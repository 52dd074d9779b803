//! Remote Cache Adapter
//!
//! Namespaced get/set/delete over an external key-value store. Keys map to
//! `prefix:namespace:key`; values are wrapped in a `{value, timestamp, ttl}`
//! envelope so staleness is checked on read even if the store's native
//! expiry has not fired yet.
//!
//! Faults degrade to a safe default (`None`, `false`, `0`) and are logged,
//! except single-key `set`/`delete`, which return the error to the caller.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::current_timestamp_ms;
use crate::error::{CacheError, Result};
use crate::remote::KeyValueStore;

// == Envelope ==
/// Wire format of every cached value in the remote store.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<V> {
    value: V,
    /// Write time, Unix milliseconds
    timestamp: u64,
    /// TTL in milliseconds
    ttl: u64,
}

impl<V> Envelope<V> {
    fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > self.ttl
    }

    fn remaining(&self, now_ms: u64) -> Duration {
        Duration::from_millis(self.timestamp.saturating_add(self.ttl).saturating_sub(now_ms))
    }
}

// == Remote Cache ==
/// Namespaced cache over a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct RemoteCache<S> {
    store: S,
    prefix: String,
    default_ttl: Duration,
}

impl<S: KeyValueStore> RemoteCache<S> {
    pub fn new(store: S, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Maps a namespaced key into the store's flat key space.
    pub fn full_key(&self, namespace: &str, key: &str) -> String {
        format!("{}:{}:{}", self.prefix, namespace, key)
    }

    fn encode<V: Serialize>(&self, value: &V, ttl: Duration) -> Result<String> {
        let envelope = Envelope {
            value,
            timestamp: current_timestamp_ms(),
            ttl: ttl.as_millis() as u64,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Decodes an envelope into its value and remaining lifetime.
    fn decode<V: DeserializeOwned>(&self, full_key: &str, raw: &str) -> Option<(V, Duration)> {
        let now = current_timestamp_ms();
        match serde_json::from_str::<Envelope<V>>(raw) {
            Ok(envelope) if envelope.is_stale(now) => {
                debug!(key = %full_key, "remote entry stale");
                None
            }
            Ok(envelope) => {
                let remaining = envelope.remaining(now);
                Some((envelope.value, remaining))
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "undecodable remote cache entry");
                None
            }
        }
    }

    // == Get ==
    pub async fn get<V: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<V> {
        self.get_with_ttl(namespace, key)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`get`](Self::get), also returning how long the entry has left to live.
    pub async fn get_with_ttl<V: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Option<(V, Duration)> {
        let full_key = self.full_key(namespace, key);
        match self.store.get(&full_key).await {
            Ok(Some(raw)) => self.decode(&full_key, &raw),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %full_key, error = %e, "remote cache GET failed");
                None
            }
        }
    }

    // == Set ==
    /// Writes with both the envelope TTL and the store's native expiry.
    pub async fn set<V: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let full_key = self.full_key(namespace, key);
        let raw = self.encode(value, ttl)?;
        self.store
            .set_with_expiry(&full_key, &raw, ttl)
            .await
            .map_err(CacheError::from)
    }

    // == Delete ==
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let full_key = self.full_key(namespace, key);
        let deleted = self.store.delete(&[full_key]).await?;
        Ok(deleted > 0)
    }

    // == Has ==
    pub async fn has(&self, namespace: &str, key: &str) -> bool {
        let full_key = self.full_key(namespace, key);
        self.store.exists(&full_key).await.unwrap_or_else(|e| {
            warn!(key = %full_key, error = %e, "remote cache EXISTS failed");
            false
        })
    }

    // == Get Many ==
    /// Fetches several keys; missing, stale or undecodable entries are omitted.
    pub async fn get_many<V: DeserializeOwned>(
        &self,
        namespace: &str,
        keys: &[&str],
    ) -> HashMap<String, V> {
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(namespace, k)).collect();
        let raw_values = match self.store.mget(&full_keys).await {
            Ok(values) => values,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "remote cache MGET failed");
                return HashMap::new();
            }
        };

        keys.iter()
            .zip(full_keys.iter())
            .zip(raw_values)
            .filter_map(|((key, full_key), raw)| {
                let (value, _) = self.decode(full_key, raw.as_deref()?)?;
                Some((key.to_string(), value))
            })
            .collect()
    }

    // == Set Many ==
    /// Writes several entries in one pipeline. Returns false on failure.
    pub async fn set_many<V: Serialize>(
        &self,
        namespace: &str,
        entries: &[(&str, V)],
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut batch = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match self.encode(value, ttl) {
                Ok(raw) => batch.push((self.full_key(namespace, key), raw, ttl)),
                Err(e) => warn!(key = %key, error = %e, "skipping unencodable entry"),
            }
        }

        match self.store.pipeline_set(&batch).await {
            Ok(()) => true,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "remote cache pipeline SET failed");
                false
            }
        }
    }

    // == Clear ==
    /// Deletes one namespace, or everything under the prefix. Returns keys removed.
    pub async fn clear(&self, namespace: Option<&str>) -> u64 {
        let pattern = match namespace {
            Some(ns) => format!("{}:{}:*", escape_glob(&self.prefix), escape_glob(ns)),
            None => format!("{}:*", escape_glob(&self.prefix)),
        };

        let keys = match self.store.keys(&pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "remote cache key scan failed");
                return 0;
            }
        };

        match self.store.delete(&keys).await {
            Ok(count) => {
                debug!(pattern = %pattern, deleted = count, "remote cache cleared");
                count
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "remote cache clear failed");
                0
            }
        }
    }

    // == Increment ==
    /// Atomic counter under a namespaced key. Returns 0 on failure.
    pub async fn increment(&self, namespace: &str, key: &str, delta: i64) -> i64 {
        let full_key = self.full_key(namespace, key);
        self.store
            .incr_by(&full_key, delta)
            .await
            .unwrap_or_else(|e| {
                warn!(key = %full_key, error = %e, "remote cache INCRBY failed");
                0
            })
    }

    // == Expire ==
    pub async fn expire(&self, namespace: &str, key: &str, ttl: Duration) -> bool {
        let full_key = self.full_key(namespace, key);
        self.store.expire(&full_key, ttl).await.unwrap_or_else(|e| {
            warn!(key = %full_key, error = %e, "remote cache EXPIRE failed");
            false
        })
    }

    // == Publish ==
    /// Publishes on `prefix:channel`. Returns receivers reached, 0 on failure.
    pub async fn publish(&self, channel: &str, message: &str) -> u64 {
        let channel = format!("{}:{}", self.prefix, channel);
        self.store
            .publish(&channel, message)
            .await
            .unwrap_or_else(|e| {
                warn!(channel = %channel, error = %e, "remote cache PUBLISH failed");
                0
            })
    }

    // == Subscribe ==
    pub async fn subscribe(&self, channel: &str) -> Option<mpsc::Receiver<String>> {
        let channel = format!("{}:{}", self.prefix, channel);
        match self.store.subscribe(&channel).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!(channel = %channel, error = %e, "remote cache SUBSCRIBE failed");
                None
            }
        }
    }
}

/// Escapes glob metacharacters so a name matches only itself in a key scan.
fn escape_glob(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
