//! API Handlers
//!
//! HTTP request handlers for the operational endpoints: health, cache
//! statistics and clearing, breaker inspection and overrides, rate limits.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::breaker::CircuitState;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::guard::UpstreamGuard;
use crate::models::{
    BreakerAction, BreakerActionResponse, BreakersResponse, CacheStatsResponse, ClearResponse,
    HealthResponse, LimitsResponse, NamespaceStatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The resilience pipeline
    pub guard: Arc<UpstreamGuard>,
}

impl AppState {
    /// Creates a new AppState around an existing guard.
    pub fn new(guard: UpstreamGuard) -> Self {
        Self {
            guard: Arc::new(guard),
        }
    }

    /// Creates a new AppState from configuration, connecting the remote
    /// cache tier if configured.
    pub async fn from_config(config: &Config) -> Self {
        Self::new(UpstreamGuard::from_config(config).await)
    }
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.guard.cache();
    let open_breakers = state
        .guard
        .breakers()
        .all_metrics()
        .into_iter()
        .filter(|m| m.state != CircuitState::Closed)
        .map(|m| m.name)
        .collect();

    Json(HealthResponse::new(
        cache.backend(),
        cache.requested_backend(),
        cache.is_remote_ready(),
        open_breakers,
    ))
}

/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let cache = state.guard.cache();

    Json(CacheStatsResponse {
        backend: cache.backend(),
        total: cache.stats(None).await,
        namespaces: cache.namespace_stats().await,
    })
}

/// Handler for GET /cache/stats/:namespace
pub async fn namespace_stats_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Result<Json<NamespaceStatsResponse>> {
    let stats = state
        .guard
        .cache()
        .namespace_stats()
        .await
        .remove(&namespace)
        .ok_or_else(|| CacheError::NotFound(format!("namespace '{}'", namespace)))?;

    Ok(Json(NamespaceStatsResponse { namespace, stats }))
}

/// Handler for DELETE /cache
pub async fn clear_all_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    state.guard.cache().clear(None).await;
    info!("Cache cleared");

    Json(ClearResponse::new(None))
}

/// Handler for DELETE /cache/:namespace
pub async fn clear_namespace_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<ClearResponse> {
    state.guard.cache().clear(Some(&namespace)).await;
    info!(namespace = %namespace, "Cache namespace cleared");

    Json(ClearResponse::new(Some(namespace)))
}

/// Handler for DELETE /cache/stats
///
/// The static stats route shadows `/cache/:namespace`, so a namespace
/// called `stats` is cleared here.
pub async fn clear_stats_namespace_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    clear_namespace_handler(State(state), Path("stats".to_string())).await
}

/// Handler for GET /breakers
pub async fn breakers_handler(State(state): State<AppState>) -> Json<BreakersResponse> {
    Json(BreakersResponse {
        breakers: state.guard.breakers().all_metrics(),
    })
}

/// Handler for POST /breakers/:name/:action
///
/// Only breakers that already exist can be overridden.
pub async fn breaker_action_handler(
    State(state): State<AppState>,
    Path((name, action)): Path<(String, BreakerAction)>,
) -> Result<Json<BreakerActionResponse>> {
    let breaker = state
        .guard
        .breakers()
        .get_existing(&name)
        .ok_or_else(|| CacheError::NotFound(format!("circuit breaker '{}'", name)))?;

    match action {
        BreakerAction::Reset => breaker.reset(),
        BreakerAction::Open => breaker.force_open(),
        BreakerAction::Close => breaker.force_closed(),
    }

    Ok(Json(BreakerActionResponse {
        state: breaker.state(),
        action: action.to_string(),
        name,
    }))
}

/// Handler for GET /limits
pub async fn limits_handler(State(state): State<AppState>) -> Json<LimitsResponse> {
    let admission = state.guard.admission();

    Json(LimitsResponse {
        limits: admission.limits(),
        usage: admission.metrics(),
        queue: state.guard.limiter().metrics(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TieredCache;

    fn state() -> AppState {
        let config = Config::default();
        let cache = TieredCache::new(config.tiered_cache_config(), None);
        AppState::new(UpstreamGuard::with_cache(&config, cache))
    }

    #[tokio::test]
    async fn test_health_handler() {
        let state = state();

        let response = health_handler(State(state.clone())).await;
        assert_eq!(response.status, "healthy");

        state.guard.breakers().get("deals").force_open();
        let response = health_handler(State(state)).await;
        assert_eq!(response.status, "degraded");
        assert_eq!(response.open_breakers, vec!["deals".to_string()]);
    }

    #[tokio::test]
    async fn test_namespace_stats_handler() {
        let state = state();
        state
            .guard
            .cache()
            .set("contacts", "1", serde_json::json!("alice"), None)
            .await
            .unwrap();

        let response = namespace_stats_handler(State(state.clone()), Path("contacts".into()))
            .await
            .unwrap();
        assert_eq!(response.stats.item_count, 1);

        let result = namespace_stats_handler(State(state), Path("unknown".into())).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_namespace_handler() {
        let state = state();
        let cache = state.guard.cache();
        cache
            .set("deals", "1", serde_json::json!(1), None)
            .await
            .unwrap();
        cache
            .set("contacts", "1", serde_json::json!(1), None)
            .await
            .unwrap();

        clear_namespace_handler(State(state.clone()), Path("deals".into())).await;

        assert_eq!(cache.stats(Some("deals")).await.item_count, 0);
        assert_eq!(cache.stats(Some("contacts")).await.item_count, 1);
    }

    #[tokio::test]
    async fn test_breaker_action_handler() {
        let state = state();
        state.guard.breakers().get("contacts");

        let response = breaker_action_handler(
            State(state.clone()),
            Path(("contacts".into(), BreakerAction::Open)),
        )
        .await
        .unwrap();
        assert_eq!(response.state, CircuitState::Open);

        let response = breaker_action_handler(
            State(state.clone()),
            Path(("contacts".into(), BreakerAction::Close)),
        )
        .await
        .unwrap();
        assert_eq!(response.state, CircuitState::Closed);

        let result =
            breaker_action_handler(State(state), Path(("missing".into(), BreakerAction::Reset)))
                .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_limits_handler() {
        let state = state();
        state.guard.admission().acquire("get_contact").unwrap();

        let response = limits_handler(State(state)).await;
        assert_eq!(response.limits.len(), 6);
        assert_eq!(
            response.usage[&crate::limiter::OperationCategory::Read].granted,
            1
        );
        assert_eq!(response.queue.total_requests, 0);
    }
}
