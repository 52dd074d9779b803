//! # Upstream Guard
//!
//! Composition root for outbound calls. Every call passes, in order:
//!
//! 1. Tiered cache (reads only) - a hit skips everything below
//! 2. Admission controller - per-category token bucket, waits or rejects
//! 3. Circuit breaker - per-target, fails fast while the target is unhealthy
//! 4. Queueing rate limiter - hourly pacing and retry with backoff
//! 5. The transport call supplied by the caller
//!
//! All components are constructed here and shared through the guard; none of
//! them is a process-wide singleton.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::breaker::CircuitBreakerRegistry;
use crate::cache::TieredCache;
use crate::config::Config;
use crate::error::{GuardError, UpstreamError};
use crate::limiter::{AdmissionController, QueueingRateLimiter};
use crate::remote::{KeyValueStore, RedisStore};
use crate::tasks::{
    spawn_breaker_event_logger, spawn_breaker_metrics_task, spawn_sweep_task, BackgroundTasks,
};

/// The resilience pipeline in front of the upstream service.
pub struct UpstreamGuard<S = RedisStore> {
    cache: TieredCache<Value, S>,
    admission: Arc<AdmissionController>,
    breakers: Arc<CircuitBreakerRegistry>,
    limiter: QueueingRateLimiter,
    admission_wait: bool,
    sweep_interval: Duration,
    metrics_interval: Duration,
}

impl UpstreamGuard<RedisStore> {
    /// Builds every component from configuration, connecting the remote cache
    /// tier if one is configured (falling back to memory if it is unreachable).
    pub async fn from_config(config: &Config) -> Self {
        let cache = TieredCache::connect(config.tiered_cache_config()).await;
        Self::with_cache(config, cache)
    }
}

impl<S: KeyValueStore> UpstreamGuard<S> {
    /// Builds the guard around an existing cache.
    pub fn with_cache(config: &Config, cache: TieredCache<Value, S>) -> Self {
        info!(
            cache_backend = %cache.backend(),
            cache_degraded = cache.is_degraded(),
            requests_per_hour = config.queue.requests_per_hour,
            admission_wait = config.admission_wait,
            "Upstream guard initialized"
        );

        Self {
            cache,
            admission: Arc::new(AdmissionController::new()),
            breakers: Arc::new(CircuitBreakerRegistry::new(config.breaker_config())),
            limiter: QueueingRateLimiter::new(config.rate_limiter_config()),
            admission_wait: config.admission_wait,
            sweep_interval: config.sweep_interval(),
            metrics_interval: config.metrics_interval(),
        }
    }

    pub fn cache(&self) -> &TieredCache<Value, S> {
        &self.cache
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn limiter(&self) -> &QueueingRateLimiter {
        &self.limiter
    }

    async fn admit(&self, operation: &str) -> Result<(), GuardError> {
        if self.admission_wait {
            self.admission.wait_and_acquire(operation).await;
            Ok(())
        } else {
            self.admission.acquire(operation).map_err(GuardError::from)
        }
    }

    /// Runs `op` for `operation` against `target` through admission, the
    /// target's breaker and the queue.
    ///
    /// `op` is invoked once per attempt by the queue.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &str,
        target: &str,
        op: F,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
        T: Send + 'static,
    {
        self.admit(operation).await?;

        let breaker = self.breakers.get(target);
        let limiter = self.limiter.clone();
        let label = operation.to_string();
        breaker
            .execute(move || async move { limiter.enqueue(label, None, op).await })
            .await
            .map_err(GuardError::from)
    }

    /// Like [`execute`](Self::execute), but an open or saturated breaker is
    /// answered by `fallback`. Admission rejections are still errors.
    pub async fn execute_with_fallback<F, Fut, T, FB, FbFut>(
        &self,
        operation: &str,
        target: &str,
        op: F,
        fallback: FB,
    ) -> Result<T, GuardError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
        T: Send + 'static,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        self.admit(operation).await?;

        let breaker = self.breakers.get(target);
        let limiter = self.limiter.clone();
        let label = operation.to_string();
        breaker
            .execute_with_fallback(
                move || async move { limiter.enqueue(label, None, op).await },
                fallback,
            )
            .await
            .map_err(GuardError::from)
    }

    /// Cache-aside read: served from the cache when present, otherwise fetched
    /// through [`execute`](Self::execute) and cached.
    ///
    /// A `null` upstream result is returned but not cached.
    pub async fn cached_read<F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        ttl: Option<Duration>,
        operation: &str,
        target: &str,
        op: F,
    ) -> Result<Value, GuardError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, UpstreamError>> + Send + 'static,
    {
        let fetched = self
            .cache
            .get_or_fetch(namespace, key, ttl, move || async move {
                debug!(namespace, key, operation, "cache miss, calling upstream");
                let value = self.execute(operation, target, op).await?;
                Ok::<_, GuardError>((!value.is_null()).then_some(value))
            })
            .await?;

        Ok(fetched.unwrap_or(Value::Null))
    }

    /// Invalidates a cached read, e.g. after a write to the same record.
    pub async fn invalidate(&self, namespace: &str, key: &str) -> Result<bool, GuardError> {
        Ok(self.cache.delete(namespace, key).await?)
    }

    /// Starts the sweep, metrics, event-logging and (tiered only)
    /// invalidation tasks. Dropping the result stops them.
    pub async fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();
        tasks.push(
            "cache-sweep",
            spawn_sweep_task(self.cache.local().clone(), self.sweep_interval),
        );
        tasks.push(
            "breaker-metrics",
            spawn_breaker_metrics_task(Arc::clone(&self.breakers), self.metrics_interval),
        );
        tasks.push("breaker-events", spawn_breaker_event_logger(&self.breakers));
        if let Some(listener) = self.cache.spawn_invalidation_listener().await {
            tasks.push("cache-invalidation", listener);
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitState;
    use crate::cache::{CacheBackend, TieredCacheConfig};
    use crate::limiter::OperationCategory;
    use crate::remote::mock::InMemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn guard(config: Config) -> UpstreamGuard<InMemoryStore> {
        let cache = TieredCache::new(config.tiered_cache_config(), None);
        UpstreamGuard::with_cache(&config, cache)
    }

    fn counting_op(
        calls: &Arc<AtomicU32>,
        result: Result<Value, UpstreamError>,
    ) -> impl FnMut() -> std::future::Ready<Result<Value, UpstreamError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(result.clone())
        }
    }

    #[tokio::test]
    async fn test_cached_read_hits_skip_upstream() {
        let guard = guard(Config::default());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let value = guard
                .cached_read(
                    "contacts",
                    "42",
                    None,
                    "get_contact",
                    "contacts",
                    counting_op(&calls, Ok(json!({"id": 42}))),
                )
                .await
                .unwrap();
            assert_eq!(value["id"], 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = guard.cache().stats(Some("contacts")).await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_null_results_are_not_cached() {
        let guard = guard(Config::default());
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let value = guard
                .cached_read(
                    "contacts",
                    "missing",
                    None,
                    "get_contact",
                    "contacts",
                    counting_op(&calls, Ok(Value::Null)),
                )
                .await
                .unwrap();
            assert!(value.is_null());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upstream_errors_propagate_and_are_not_cached() {
        let guard = guard(Config::default());
        let calls = Arc::new(AtomicU32::new(0));
        let not_found = UpstreamError::Status {
            status: 404,
            message: "missing".into(),
        };

        let err = guard
            .cached_read(
                "deals",
                "7",
                None,
                "get_deal",
                "deals",
                counting_op(&calls, Err(not_found.clone())),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::Upstream(e) if e == not_found));
        assert!(!guard.cache().local().has("deals", "7").await);
        // Client errors are not retried and do not count against the breaker.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.breakers().get("deals").metrics().failure_count, 0);
    }

    #[tokio::test]
    async fn test_admission_rejects_without_waiting() {
        let mut config = Config::default();
        config.admission_wait = false;
        let guard = guard(config);
        let calls = Arc::new(AtomicU32::new(0));

        // Batch burst is 2.
        for _ in 0..2 {
            guard
                .execute("batch_create", "batch", counting_op(&calls, Ok(json!([]))))
                .await
                .unwrap();
        }
        let err = guard
            .execute("batch_create", "batch", counting_op(&calls, Ok(json!([]))))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuardError::RateLimited(ref limited) if limited.category == OperationCategory::Batch
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_fast_and_falls_back() {
        let mut config = Config::default();
        config.breaker.volume_threshold = 2;
        config.queue.max_retries = 0;
        let guard = guard(config);
        let calls = Arc::new(AtomicU32::new(0));
        let unavailable = UpstreamError::Status {
            status: 503,
            message: "unavailable".into(),
        };

        for _ in 0..2 {
            let err = guard
                .execute("update_deal", "deals", counting_op(&calls, Err(unavailable.clone())))
                .await
                .unwrap_err();
            assert!(matches!(err, GuardError::Upstream(_)));
        }
        assert_eq!(guard.breakers().get("deals").state(), CircuitState::Open);

        let err = guard
            .execute("update_deal", "deals", counting_op(&calls, Ok(json!({}))))
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::CircuitOpen { .. }));

        let value = guard
            .execute_with_fallback(
                "update_deal",
                "deals",
                counting_op(&calls, Ok(json!({"fresh": true}))),
                || async { json!({"stale": true}) },
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"stale": true}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Other targets are unaffected.
        guard
            .execute("update_company", "companies", counting_op(&calls, Ok(json!({}))))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tiered_guard_promotes_and_invalidates() {
        let store = InMemoryStore::new();
        let config = Config::default();
        let cache = TieredCache::new(
            TieredCacheConfig {
                backend: CacheBackend::Tiered,
                ..config.tiered_cache_config()
            },
            Some(store.clone()),
        );
        let guard = UpstreamGuard::with_cache(&config, cache);
        let calls = Arc::new(AtomicU32::new(0));

        guard
            .cached_read(
                "contacts",
                "1",
                None,
                "get_contact",
                "contacts",
                counting_op(&calls, Ok(json!("alice"))),
            )
            .await
            .unwrap();
        assert!(store.raw("gateway:contacts:1").is_some());

        assert!(guard.invalidate("contacts", "1").await.unwrap());
        assert!(store.raw("gateway:contacts:1").is_none());
        assert!(!guard.cache().local().has("contacts", "1").await);
    }

    #[tokio::test]
    async fn test_background_tasks_start_and_stop() {
        let guard = guard(Config::default());
        let tasks = guard.start_background_tasks().await;

        assert_eq!(
            tasks.names(),
            vec!["cache-sweep", "breaker-metrics", "breaker-events"]
        );
        tasks.shutdown().await;
    }
}
