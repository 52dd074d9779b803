//! API Routes
//!
//! Configures the Axum router with the operational endpoints.

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    breaker_action_handler, breakers_handler, cache_stats_handler, clear_all_handler,
    clear_namespace_handler, clear_stats_namespace_handler, health_handler, limits_handler,
    namespace_stats_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Cache backend and breaker health
/// - `GET /cache/stats` - Aggregate and per-namespace statistics
/// - `GET /cache/stats/:namespace` - One namespace
/// - `DELETE /cache` - Clear every namespace
/// - `DELETE /cache/:namespace` - Clear one namespace (`/cache/stats` is
///   routed to the same action for a namespace named `stats`)
/// - `GET /breakers` - Metrics of every breaker
/// - `POST /breakers/:name/:action` - `reset`, `open` or `close`
/// - `GET /limits` - Token buckets and hourly queue
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/cache", delete(clear_all_handler))
        .route(
            "/cache/stats",
            get(cache_stats_handler).delete(clear_stats_namespace_handler),
        )
        .route("/cache/stats/:namespace", get(namespace_stats_handler))
        .route("/cache/:namespace", delete(clear_namespace_handler))
        .route("/breakers", get(breakers_handler))
        .route("/breakers/:name/:action", post(breaker_action_handler))
        .route("/limits", get(limits_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
