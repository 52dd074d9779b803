//! Response DTOs for the operational API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::breaker::{BreakerMetrics, CircuitState};
use crate::cache::{CacheBackend, CacheStats};
use crate::limiter::{BucketMetrics, CategoryLimit, OperationCategory, QueueMetrics};

/// Response body for the health endpoint (GET /health)
///
/// `status` is `degraded` when the configured cache backend could not be
/// used or a circuit is not closed.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`
    pub status: String,
    /// Backend serving requests
    pub cache_backend: CacheBackend,
    /// Backend asked for in configuration
    pub requested_cache_backend: CacheBackend,
    pub remote_cache_ready: bool,
    /// Names of breakers that are open or half-open
    pub open_breakers: Vec<String>,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(
        cache_backend: CacheBackend,
        requested_cache_backend: CacheBackend,
        remote_cache_ready: bool,
        open_breakers: Vec<String>,
    ) -> Self {
        let degraded = cache_backend != requested_cache_backend || !open_breakers.is_empty();
        Self {
            status: if degraded { "degraded" } else { "healthy" }.to_string(),
            cache_backend,
            requested_cache_backend,
            remote_cache_ready,
            open_breakers,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for GET /cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    pub backend: CacheBackend,
    /// Aggregate over all namespaces
    pub total: CacheStats,
    pub namespaces: BTreeMap<String, CacheStats>,
}

/// Response body for GET /cache/stats/:namespace
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStatsResponse {
    pub namespace: String,
    #[serde(flatten)]
    pub stats: CacheStats,
}

/// Response body for DELETE /cache and DELETE /cache/:namespace
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Success message
    pub message: String,
    /// The cleared namespace, absent when everything was cleared
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ClearResponse {
    pub fn new(namespace: Option<String>) -> Self {
        let message = match &namespace {
            Some(ns) => format!("Namespace '{}' cleared", ns),
            None => "All namespaces cleared".to_string(),
        };
        Self { message, namespace }
    }
}

/// Response body for GET /breakers
#[derive(Debug, Clone, Serialize)]
pub struct BreakersResponse {
    pub breakers: Vec<BreakerMetrics>,
}

/// Response body for POST /breakers/:name/:action
#[derive(Debug, Clone, Serialize)]
pub struct BreakerActionResponse {
    pub name: String,
    pub action: String,
    pub state: CircuitState,
}

/// Response body for GET /limits
#[derive(Debug, Clone, Serialize)]
pub struct LimitsResponse {
    /// Configured rate and burst per category
    pub limits: BTreeMap<OperationCategory, CategoryLimit>,
    /// Current bucket state per category
    pub usage: BTreeMap<OperationCategory, BucketMetrics>,
    /// Hourly queue
    pub queue: QueueMetrics,
}
