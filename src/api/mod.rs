//! API Module
//!
//! Operational HTTP surface over the upstream guard. The guarded upstream
//! calls themselves are made in-process by the gateway, not over this API.
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /cache/stats`, `GET /cache/stats/:namespace` - Cache statistics
//! - `DELETE /cache`, `DELETE /cache/:namespace` - Clear the cache
//! - `GET /breakers`, `POST /breakers/:name/:action` - Breaker metrics and overrides
//! - `GET /limits` - Admission and queue state

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
