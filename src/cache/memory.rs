//! Memory Cache Module
//!
//! Namespaced in-memory cache. Each namespace is created lazily on first use
//! with its own eviction policy instance and size budget.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheStats, NamespaceConfig, NamespaceStore};
use crate::error::Result;

// == Memory Cache Config ==
/// Defaults applied to namespaces that were not configured explicitly.
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// TTL for writes without an explicit one
    pub default_ttl: Duration,
    /// Policy and budget for new namespaces
    pub namespace_defaults: NamespaceConfig,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            namespace_defaults: NamespaceConfig::default(),
        }
    }
}

#[derive(Debug)]
struct Namespaces<V> {
    stores: HashMap<String, NamespaceStore<V>>,
    overrides: HashMap<String, NamespaceConfig>,
}

impl<V> Namespaces<V> {
    fn store(&mut self, namespace: &str, config: &MemoryCacheConfig) -> &mut NamespaceStore<V> {
        let overrides = &self.overrides;
        self.stores
            .entry(namespace.to_string())
            .or_insert_with(|| {
                let ns_config = overrides
                    .get(namespace)
                    .copied()
                    .unwrap_or(config.namespace_defaults);
                debug!(namespace = %namespace, policy = %ns_config.policy, "creating cache namespace");
                NamespaceStore::new(ns_config, config.default_ttl)
            })
    }
}

// == Memory Cache ==
/// Cheaply clonable handle to a shared, namespaced in-memory cache.
pub struct MemoryCache<V> {
    namespaces: Arc<Mutex<Namespaces<V>>>,
    config: Arc<MemoryCacheConfig>,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            namespaces: Arc::clone(&self.namespaces),
            config: Arc::clone(&self.config),
        }
    }
}

impl<V> MemoryCache<V>
where
    V: Clone + Serialize + Send + 'static,
{
    // == Constructor ==
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            namespaces: Arc::new(Mutex::new(Namespaces {
                stores: HashMap::new(),
                overrides: HashMap::new(),
            })),
            config: Arc::new(config),
        }
    }

    /// Default TTL for writes without an explicit one.
    pub fn default_ttl(&self) -> Duration {
        self.config.default_ttl
    }

    // == Configure Namespace ==
    /// Sets the policy and budget for a namespace.
    ///
    /// Takes effect immediately if the namespace does not exist yet or is
    /// empty; otherwise on the next `clear` of that namespace.
    pub async fn configure_namespace(&self, namespace: &str, ns_config: NamespaceConfig) {
        let mut guard = self.namespaces.lock().await;
        guard.overrides.insert(namespace.to_string(), ns_config);
        let replace = guard
            .stores
            .get(namespace)
            .map(|store| store.is_empty())
            .unwrap_or(false);
        if replace {
            guard.stores.insert(
                namespace.to_string(),
                NamespaceStore::new(ns_config, self.config.default_ttl),
            );
        }
    }

    // == Get ==
    /// Returns the live value for `key`, recording a hit or miss.
    pub async fn get(&self, namespace: &str, key: &str) -> Option<V> {
        let mut guard = self.namespaces.lock().await;
        guard.store(namespace, &self.config).get(key)
    }

    // == Get Or Fetch ==
    /// Cache-aside read: on a miss, runs `fetcher`, stores a non-empty result
    /// and returns it. Fetcher errors propagate and nothing is cached.
    ///
    /// The lock is not held while the fetcher runs.
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
        E: From<crate::error::CacheError>,
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
    /// Stores a value, evicting per the namespace policy as needed.
    pub async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: V,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut guard = self.namespaces.lock().await;
        guard
            .store(namespace, &self.config)
            .set(key.to_string(), value, ttl)
    }

    // == Delete ==
    /// Removes a key. Returns whether it existed.
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let mut guard = self.namespaces.lock().await;
        guard
            .stores
            .get_mut(namespace)
            .map(|store| store.delete(key))
            .unwrap_or(false)
    }

    // == Has ==
    /// Whether a live entry exists, without touching stats or recency.
    pub async fn has(&self, namespace: &str, key: &str) -> bool {
        let guard = self.namespaces.lock().await;
        guard
            .stores
            .get(namespace)
            .map(|store| store.contains(key))
            .unwrap_or(false)
    }

    // == Clear ==
    /// Clears one namespace (entries and statistics) or, with `None`, all of them.
    pub async fn clear(&self, namespace: Option<&str>) {
        let mut guard = self.namespaces.lock().await;
        match namespace {
            Some(ns) => {
                if let Some(store) = guard.stores.get_mut(ns) {
                    *store = NamespaceStore::new(store.config(), self.config.default_ttl);
                }
            }
            None => guard.stores.clear(),
        }
    }

    // == Stats ==
    /// Snapshot of one namespace, or the aggregate of all namespaces.
    ///
    /// Unknown namespaces report all-zero statistics.
    pub async fn stats(&self, namespace: Option<&str>) -> CacheStats {
        let guard = self.namespaces.lock().await;
        match namespace {
            Some(ns) => guard
                .stores
                .get(ns)
                .map(|store| store.stats())
                .unwrap_or_default(),
            None => {
                let mut total = CacheStats::new();
                for store in guard.stores.values() {
                    total.merge(&store.stats());
                }
                total
            }
        }
    }

    /// Snapshot of every namespace, sorted by name.
    pub async fn namespace_stats(&self) -> BTreeMap<String, CacheStats> {
        let guard = self.namespaces.lock().await;
        guard
            .stores
            .iter()
            .map(|(name, store)| (name.clone(), store.stats()))
            .collect()
    }

    // == Cleanup Expired ==
    /// Sweeps expired entries from every namespace. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut guard = self.namespaces.lock().await;
        guard
            .stores
            .values_mut()
            .map(|store| store.cleanup_expired())
            .sum()
    }
}
