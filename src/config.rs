//! Configuration Module
//!
//! Loads guard and server configuration from environment variables.
//! Unset or unparseable variables fall back to their defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;
use crate::cache::{
    CacheBackend, EvictionPolicy, MemoryCacheConfig, NamespaceConfig, TieredCacheConfig,
};
use crate::limiter::RateLimiterConfig;

/// Reads `name` and parses it, or returns `default`.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Byte budget per namespace
    pub max_size_bytes: usize,
    /// Entry budget per namespace
    pub max_entries: usize,
    pub default_ttl_ms: u64,
    /// TTL cap for the local tier in tiered mode
    pub l1_ttl_ms: u64,
    pub eviction_policy: EvictionPolicy,
    pub sweep_interval_secs: u64,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            max_size_bytes: 50 * 1024 * 1024,
            max_entries: 10_000,
            default_ttl_ms: 300_000,
            l1_ttl_ms: 60_000,
            eviction_policy: EvictionPolicy::Lru,
            sweep_interval_secs: 60,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "gateway".to_string(),
        }
    }
}

/// Circuit breaker defaults applied to every target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
    pub reset_timeout_ms: u64,
    pub volume_threshold: u32,
    pub max_half_open: u32,
    pub metrics_interval_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 50,
            success_threshold: 3,
            timeout_ms: 30_000,
            reset_timeout_ms: 60_000,
            volume_threshold: 10,
            max_half_open: 1,
            metrics_interval_secs: 30,
        }
    }
}

/// Hourly queue settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub requests_per_hour: u32,
    pub max_retries: u32,
    pub max_backoff_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            requests_per_hour: 1000,
            max_retries: 3,
            max_backoff_ms: 30_000,
        }
    }
}

/// Server configuration parameters.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache: CacheSettings,
    pub breaker: BreakerSettings,
    pub queue: QueueSettings,
    /// Wait for a token instead of rejecting when a bucket is empty
    pub admission_wait: bool,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_BACKEND` - `memory`, `remote` or `tiered` (default: memory)
    /// - `CACHE_MAX_SIZE_BYTES` - Byte budget per namespace (default: 50 MiB)
    /// - `CACHE_MAX_ENTRIES` - Entry budget per namespace (default: 10000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL (default: 300000)
    /// - `CACHE_L1_TTL_MS` - Local tier TTL cap in tiered mode (default: 60000)
    /// - `CACHE_EVICTION_POLICY` - `lru`, `lfu` or `fifo` (default: lru)
    /// - `CACHE_SWEEP_INTERVAL_SECS` - Expiry sweep interval (default: 60)
    /// - `REDIS_URL` - Remote store (default: redis://127.0.0.1:6379)
    /// - `CACHE_KEY_PREFIX` - Remote key prefix (default: gateway)
    /// - `BREAKER_FAILURE_THRESHOLD` - Failure percentage / consecutive count (default: 50)
    /// - `BREAKER_SUCCESS_THRESHOLD` - Probe successes to close (default: 3)
    /// - `BREAKER_TIMEOUT_MS` - Call deadline (default: 30000)
    /// - `BREAKER_RESET_TIMEOUT_MS` - Open duration before a probe (default: 60000)
    /// - `BREAKER_VOLUME_THRESHOLD` - Minimum history before opening (default: 10)
    /// - `BREAKER_MAX_HALF_OPEN` - Concurrent probes (default: 1)
    /// - `BREAKER_METRICS_INTERVAL_SECS` - Metrics emission interval (default: 30)
    /// - `RATE_LIMIT_PER_HOUR` - Hourly upstream budget (default: 1000)
    /// - `RATE_LIMIT_MAX_RETRIES` - Retries for transient failures (default: 3)
    /// - `RATE_LIMIT_MAX_BACKOFF_MS` - Backoff cap (default: 30000)
    /// - `ADMISSION_WAIT` - Wait for tokens instead of rejecting (default: true)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let cache_defaults = CacheSettings::default();
        let breaker_defaults = BreakerSettings::default();
        let queue_defaults = QueueSettings::default();

        Self {
            cache: CacheSettings {
                backend: env_or("CACHE_BACKEND", cache_defaults.backend),
                max_size_bytes: env_or("CACHE_MAX_SIZE_BYTES", cache_defaults.max_size_bytes),
                max_entries: env_or("CACHE_MAX_ENTRIES", cache_defaults.max_entries),
                default_ttl_ms: env_or("CACHE_DEFAULT_TTL_MS", cache_defaults.default_ttl_ms),
                l1_ttl_ms: env_or("CACHE_L1_TTL_MS", cache_defaults.l1_ttl_ms),
                eviction_policy: env_or("CACHE_EVICTION_POLICY", cache_defaults.eviction_policy),
                sweep_interval_secs: env_or(
                    "CACHE_SWEEP_INTERVAL_SECS",
                    cache_defaults.sweep_interval_secs,
                ),
                redis_url: env::var("REDIS_URL").unwrap_or(cache_defaults.redis_url),
                key_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or(cache_defaults.key_prefix),
            },
            breaker: BreakerSettings {
                failure_threshold: env_or(
                    "BREAKER_FAILURE_THRESHOLD",
                    breaker_defaults.failure_threshold,
                ),
                success_threshold: env_or(
                    "BREAKER_SUCCESS_THRESHOLD",
                    breaker_defaults.success_threshold,
                ),
                timeout_ms: env_or("BREAKER_TIMEOUT_MS", breaker_defaults.timeout_ms),
                reset_timeout_ms: env_or(
                    "BREAKER_RESET_TIMEOUT_MS",
                    breaker_defaults.reset_timeout_ms,
                ),
                volume_threshold: env_or(
                    "BREAKER_VOLUME_THRESHOLD",
                    breaker_defaults.volume_threshold,
                ),
                max_half_open: env_or("BREAKER_MAX_HALF_OPEN", breaker_defaults.max_half_open),
                metrics_interval_secs: env_or(
                    "BREAKER_METRICS_INTERVAL_SECS",
                    breaker_defaults.metrics_interval_secs,
                ),
            },
            queue: QueueSettings {
                requests_per_hour: env_or("RATE_LIMIT_PER_HOUR", queue_defaults.requests_per_hour),
                max_retries: env_or("RATE_LIMIT_MAX_RETRIES", queue_defaults.max_retries),
                max_backoff_ms: env_or("RATE_LIMIT_MAX_BACKOFF_MS", queue_defaults.max_backoff_ms),
            },
            admission_wait: env_or("ADMISSION_WAIT", true),
            server_port: env_or("SERVER_PORT", 3000),
        }
    }

    /// Settings for the tiered cache.
    pub fn tiered_cache_config(&self) -> TieredCacheConfig {
        TieredCacheConfig {
            backend: self.cache.backend,
            l1_ttl: Duration::from_millis(self.cache.l1_ttl_ms),
            memory: MemoryCacheConfig {
                default_ttl: Duration::from_millis(self.cache.default_ttl_ms),
                namespace_defaults: NamespaceConfig {
                    policy: self.cache.eviction_policy,
                    max_size_bytes: self.cache.max_size_bytes,
                    max_entries: self.cache.max_entries,
                },
            },
            redis_url: self.cache.redis_url.clone(),
            key_prefix: self.cache.key_prefix.clone(),
        }
    }

    /// Breaker configuration shared by all targets. Only server-side faults
    /// count toward opening a circuit.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.breaker.failure_threshold)
            .with_success_threshold(self.breaker.success_threshold)
            .with_timeout(Duration::from_millis(self.breaker.timeout_ms))
            .with_reset_timeout(Duration::from_millis(self.breaker.reset_timeout_ms))
            .with_volume_threshold(self.breaker.volume_threshold)
            .with_max_half_open_requests(self.breaker.max_half_open)
            .counting_server_faults()
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_hour: self.queue.requests_per_hour,
            max_retries: self.queue.max_retries,
            max_backoff: Duration::from_millis(self.queue.max_backoff_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs.max(1))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.breaker.metrics_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            breaker: BreakerSettings::default(),
            queue: QueueSettings::default(),
            admission_wait: true,
            server_port: 3000,
        }
    }
}
