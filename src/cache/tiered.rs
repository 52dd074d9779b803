//! Tiered Cache Module
//!
//! Local memory cache (L1) in front of the remote cache (L2), with the backend
//! selectable at construction.
//!
//! ## Lookup Order (tiered)
//!
//! 1. Check L1 - no I/O
//! 2. Check L2 - one network round trip; a hit is promoted into L1
//! 3. Run the fetcher, if any, and write the result to both tiers
//!
//! L1 is authoritative for read-your-writes: once it has been written, an L2
//! write failure is logged and the operation still succeeds.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, MemoryCache, MemoryCacheConfig};
use crate::error::{CacheError, Result};
use crate::remote::{redact_url, KeyValueStore, RedisStore, RemoteCache};

/// Pub/sub channel (under the key prefix) carrying `(namespace, key)` invalidations.
const INVALIDATION_CHANNEL: &str = "invalidate";

// == Cache Backend ==
/// Which tiers serve reads and writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Local memory only
    #[default]
    Memory,
    /// Remote store only
    Remote,
    /// Memory (L1) in front of remote (L2)
    Tiered,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Remote => "remote",
            CacheBackend::Tiered => "tiered",
        };
        f.write_str(name)
    }
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "remote" | "redis" => Ok(CacheBackend::Remote),
            "tiered" => Ok(CacheBackend::Tiered),
            other => Err(format!("unknown cache backend: {other}")),
        }
    }
}

// == Tiered Cache Config ==
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Requested backend
    pub backend: CacheBackend,
    /// Upper bound on L1 TTL in tiered mode
    pub l1_ttl: Duration,
    /// Local tier settings (the default TTL also applies to L2)
    pub memory: MemoryCacheConfig,
    /// Remote store address
    pub redis_url: String,
    /// Remote key prefix
    pub key_prefix: String,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            l1_ttl: Duration::from_secs(60),
            memory: MemoryCacheConfig::default(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "gateway".to_string(),
        }
    }
}

// == Tiered Cache ==
pub struct TieredCache<V, S = RedisStore> {
    requested: CacheBackend,
    backend: CacheBackend,
    local: MemoryCache<V>,
    remote: Option<RemoteCache<S>>,
    l1_ttl: Duration,
}

impl<V, S: Clone> Clone for TieredCache<V, S> {
    fn clone(&self) -> Self {
        Self {
            requested: self.requested,
            backend: self.backend,
            local: self.local.clone(),
            remote: self.remote.clone(),
            l1_ttl: self.l1_ttl,
        }
    }
}

impl<V> TieredCache<V, RedisStore>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Builds the cache, connecting to Redis when the backend needs it.
    ///
    /// A failed connection downgrades to memory-only instead of failing;
    /// check [`is_remote_ready`](Self::is_remote_ready).
    pub async fn connect(config: TieredCacheConfig) -> Self {
        if config.backend == CacheBackend::Memory {
            return Self::new(config, None);
        }

        match RedisStore::connect(&config.redis_url).await {
            Ok(store) => {
                info!(backend = %config.backend, url = %redact_url(&config.redis_url), "remote cache tier connected");
                Self::new(config, Some(store))
            }
            Err(e) => {
                warn!(
                    backend = %config.backend,
                    url = %redact_url(&config.redis_url),
                    error = %e,
                    "remote cache tier unavailable, falling back to memory"
                );
                Self::new(config, None)
            }
        }
    }
}

impl<V, S> TieredCache<V, S>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: KeyValueStore,
{
    /// Builds the cache over an already-connected store. Without a store
    /// the effective backend is memory.
    pub fn new(config: TieredCacheConfig, store: Option<S>) -> Self {
        let default_ttl = config.memory.default_ttl;
        let remote = match config.backend {
            CacheBackend::Memory => None,
            _ => store.map(|s| RemoteCache::new(s, config.key_prefix.clone(), default_ttl)),
        };
        let backend = if remote.is_some() {
            config.backend
        } else {
            CacheBackend::Memory
        };

        Self {
            requested: config.backend,
            backend,
            local: MemoryCache::new(config.memory),
            remote,
            l1_ttl: config.l1_ttl,
        }
    }

    /// Backend actually serving requests.
    pub fn backend(&self) -> CacheBackend {
        self.backend
    }

    /// Backend asked for in configuration.
    pub fn requested_backend(&self) -> CacheBackend {
        self.requested
    }

    /// Whether the remote tier is in use (false after a downgrade or in memory mode).
    pub fn is_remote_ready(&self) -> bool {
        self.remote.is_some()
    }

    /// Whether the requested backend could not be honoured.
    pub fn is_degraded(&self) -> bool {
        self.requested != self.backend
    }

    pub fn local(&self) -> &MemoryCache<V> {
        &self.local
    }

    pub fn remote(&self) -> Option<&RemoteCache<S>> {
        self.remote.as_ref()
    }

    fn l1_ttl_for(&self, ttl: Option<Duration>) -> Duration {
        ttl.unwrap_or(self.local.default_ttl()).min(self.l1_ttl)
    }

    // == Get ==
    pub async fn get(&self, namespace: &str, key: &str) -> Option<V> {
        match (&self.backend, &self.remote) {
            (CacheBackend::Remote, Some(remote)) => remote.get(namespace, key).await,
            (CacheBackend::Tiered, Some(remote)) => {
                if let Some(value) = self.local.get(namespace, key).await {
                    debug!(namespace = %namespace, key = %key, "cache hit (L1)");
                    return Some(value);
                }

                let (value, remaining): (V, Duration) =
                    remote.get_with_ttl(namespace, key).await?;
                // The L1 copy must not outlive the L2 entry.
                let l1_ttl = remaining.min(self.l1_ttl);
                if l1_ttl.is_zero() {
                    return Some(value);
                }
                debug!(
                    namespace = %namespace,
                    key = %key,
                    l1_ttl_ms = l1_ttl.as_millis() as u64,
                    "cache hit (L2), promoting"
                );
                if let Err(e) = self
                    .local
                    .set(namespace, key, value.clone(), Some(l1_ttl))
                    .await
                {
                    warn!(namespace = %namespace, key = %key, error = %e, "L1 promotion failed");
                }
                Some(value)
            }
            _ => self.local.get(namespace, key).await,
        }
    }

    // == Get Or Fetch ==
    /// Cache-aside read across the configured tiers. Fetcher errors propagate
    /// and are not cached; an empty fetch result is not cached either.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Option<Duration>,
        fetcher: F,
    ) -> std::result::Result<Option<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: From<CacheError>,
    {
        if let Some(value) = self.get(namespace, key).await {
            return Ok(Some(value));
        }

        let fetched = fetcher().await?;
        if let Some(value) = &fetched {
            self.set(namespace, key, value.clone(), ttl).await?;
        }
        Ok(fetched)
    }

    // == Set ==
    pub async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        match (&self.backend, &self.remote) {
            (CacheBackend::Remote, Some(remote)) => remote.set(namespace, key, &value, ttl).await,
            (CacheBackend::Tiered, Some(remote)) => {
                self.local
                    .set(namespace, key, value.clone(), Some(self.l1_ttl_for(ttl)))
                    .await?;
                if let Err(e) = remote.set(namespace, key, &value, ttl).await {
                    warn!(namespace = %namespace, key = %key, error = %e, "L2 write failed, L1 kept");
                }
                Ok(())
            }
            _ => self.local.set(namespace, key, value, ttl).await,
        }
    }

    // == Delete ==
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        match (&self.backend, &self.remote) {
            (CacheBackend::Remote, Some(remote)) => remote.delete(namespace, key).await,
            (CacheBackend::Tiered, Some(remote)) => {
                let local_hit = self.local.delete(namespace, key).await;
                let remote_hit = match remote.delete(namespace, key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        warn!(namespace = %namespace, key = %key, error = %e, "L2 delete failed");
                        false
                    }
                };
                match serde_json::to_string(&(namespace, key)) {
                    Ok(message) => {
                        remote.publish(INVALIDATION_CHANNEL, &message).await;
                    }
                    Err(e) => warn!(error = %e, "could not encode invalidation"),
                }
                Ok(local_hit || remote_hit)
            }
            _ => Ok(self.local.delete(namespace, key).await),
        }
    }

    // == Clear ==
    pub async fn clear(&self, namespace: Option<&str>) {
        if let Some(remote) = &self.remote {
            let removed = remote.clear(namespace).await;
            debug!(namespace = ?namespace, removed, "remote tier cleared");
        }
        self.local.clear(namespace).await;
    }

    // == Stats ==
    /// Local tier statistics.
    pub async fn stats(&self, namespace: Option<&str>) -> CacheStats {
        self.local.stats(namespace).await
    }

    pub async fn namespace_stats(&self) -> BTreeMap<String, CacheStats> {
        self.local.namespace_stats().await
    }

    // == Invalidation Listener ==
    /// Subscribes to invalidations published by other instances and drops the
    /// matching L1 entries. Returns `None` when there is no remote tier.
    pub async fn spawn_invalidation_listener(&self) -> Option<JoinHandle<()>> {
        if self.backend != CacheBackend::Tiered {
            return None;
        }
        let mut rx = self.remote.as_ref()?.subscribe(INVALIDATION_CHANNEL).await?;
        let local = self.local.clone();

        Some(tokio::spawn(async move {
            info!("Subscribed to cache invalidation channel");
            while let Some(message) = rx.recv().await {
                match serde_json::from_str::<(String, String)>(&message) {
                    Ok((namespace, key)) => {
                        debug!(namespace = %namespace, key = %key, "received cache invalidation");
                        local.delete(&namespace, &key).await;
                    }
                    Err(e) => warn!(error = %e, "failed to parse invalidation message"),
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::mock::InMemoryStore;
    use serde_json::{json, Value};

    fn tiered(store: &InMemoryStore, backend: CacheBackend) -> TieredCache<Value, InMemoryStore> {
        let config = TieredCacheConfig {
            backend,
            ..TieredCacheConfig::default()
        };
        TieredCache::new(config, Some(store.clone()))
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("tiered".parse::<CacheBackend>(), Ok(CacheBackend::Tiered));
        assert_eq!("REDIS".parse::<CacheBackend>(), Ok(CacheBackend::Remote));
        assert!("disk".parse::<CacheBackend>().is_err());
    }

    #[tokio::test]
    async fn test_missing_store_downgrades_to_memory() {
        let config = TieredCacheConfig {
            backend: CacheBackend::Tiered,
            ..TieredCacheConfig::default()
        };
        let cache: TieredCache<Value, InMemoryStore> = TieredCache::new(config, None);

        assert_eq!(cache.backend(), CacheBackend::Memory);
        assert_eq!(cache.requested_backend(), CacheBackend::Tiered);
        assert!(!cache.is_remote_ready());
        assert!(cache.is_degraded());

        cache.set("ns", "k", json!(1), None).await.unwrap();
        assert_eq!(cache.get("ns", "k").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_l2_hit_is_promoted_to_l1() {
        let store = InMemoryStore::new();
        let cache = tiered(&store, CacheBackend::Tiered);
        let remote = cache.remote().unwrap();
        remote
            .set("contacts", "7", &json!({"id": 7}), None)
            .await
            .unwrap();

        assert!(!cache.local().has("contacts", "7").await);
        assert_eq!(cache.get("contacts", "7").await, Some(json!({"id": 7})));
        assert!(cache.local().has("contacts", "7").await);
        assert_eq!(store.get_calls(), 1);

        assert_eq!(cache.get("contacts", "7").await, Some(json!({"id": 7})));
        assert_eq!(store.get_calls(), 1, "second read served from L1");
    }

    #[tokio::test]
    async fn test_promoted_value_expires_with_its_l2_entry() {
        let store = InMemoryStore::new();
        let writer = tiered(&store, CacheBackend::Tiered);
        let reader = tiered(&store, CacheBackend::Tiered);

        writer
            .set("ns", "k", json!("v"), Some(Duration::from_millis(200)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reader.get("ns", "k").await, Some(json!("v")));
        assert!(reader.local().has("ns", "k").await);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(writer.get("ns", "k").await, None);
        assert_eq!(reader.get("ns", "k").await, None, "L1 copy outlived its TTL");
    }

    #[tokio::test]
    async fn test_l1_ttl_is_capped_and_l2_refills_it() {
        let store = InMemoryStore::new();
        let config = TieredCacheConfig {
            backend: CacheBackend::Tiered,
            l1_ttl: Duration::from_millis(50),
            ..TieredCacheConfig::default()
        };
        let cache: TieredCache<Value, InMemoryStore> = TieredCache::new(config, Some(store.clone()));

        cache
            .set("ns", "k", json!(1), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(cache.local().has("ns", "k").await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!cache.local().has("ns", "k").await);
        assert_eq!(cache.get("ns", "k").await, Some(json!(1)));
        assert_eq!(store.get_calls(), 1);
        assert!(cache.local().has("ns", "k").await);
        assert_eq!(store.write_calls(), 1, "promotion does not write back to L2");
    }

    #[tokio::test]
    async fn test_double_miss_fetches_and_writes_both_tiers() {
        let store = InMemoryStore::new();
        let cache = tiered(&store, CacheBackend::Tiered);

        let value: std::result::Result<_, CacheError> = cache
            .get_or_fetch("deals", "1", None, || async { Ok(Some(json!("fetched"))) })
            .await;
        assert_eq!(value.unwrap(), Some(json!("fetched")));

        assert!(cache.local().has("deals", "1").await);
        assert!(store.raw("gateway:deals:1").is_some());
    }

    #[tokio::test]
    async fn test_l2_write_failure_does_not_fail_tiered_set() {
        let store = InMemoryStore::new();
        let cache = tiered(&store, CacheBackend::Tiered);
        store.set_failing(true);

        cache.set("ns", "k", json!("v"), None).await.unwrap();
        assert_eq!(cache.get("ns", "k").await, Some(json!("v")));
        assert!(cache.delete("ns", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_remote_only_write_failure_propagates() {
        let store = InMemoryStore::new();
        let cache = tiered(&store, CacheBackend::Remote);

        cache.set("ns", "k", json!("v"), None).await.unwrap();
        assert!(!cache.local().has("ns", "k").await);
        assert_eq!(cache.get("ns", "k").await, Some(json!("v")));

        store.set_failing(true);
        assert!(cache.set("ns", "k", json!("w"), None).await.is_err());
        assert_eq!(cache.get("ns", "k").await, None);
    }

    #[tokio::test]
    async fn test_delete_and_clear_fan_out() {
        let store = InMemoryStore::new();
        let cache = tiered(&store, CacheBackend::Tiered);

        cache.set("ns", "a", json!(1), None).await.unwrap();
        cache.set("ns", "b", json!(2), None).await.unwrap();

        assert!(cache.delete("ns", "a").await.unwrap());
        assert!(store.raw("gateway:ns:a").is_none());

        cache.clear(Some("ns")).await;
        assert!(store.raw("gateway:ns:b").is_none());
        assert_eq!(cache.stats(Some("ns")).await.item_count, 0);
    }

    #[tokio::test]
    async fn test_invalidation_listener_drops_l1_entries() {
        let store = InMemoryStore::new();
        let writer = tiered(&store, CacheBackend::Tiered);
        let reader = tiered(&store, CacheBackend::Tiered);
        let handle = reader.spawn_invalidation_listener().await.unwrap();

        reader.set("ns", "k", json!("v"), None).await.unwrap();
        writer.delete("ns", "k").await.unwrap();

        let mut gone = false;
        for _ in 0..50 {
            if !reader.local().has("ns", "k").await {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gone, "reader L1 should be invalidated");
        handle.abort();
    }
}
