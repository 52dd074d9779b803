//! Upstream Guard - resilience and caching in front of a rate-limited API
//!
//! Namespaced caching with pluggable eviction and an optional remote tier,
//! per-target circuit breakers, and two admission controllers (per-category
//! token buckets and an hourly request queue), composed by [`UpstreamGuard`].

pub mod api;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod limiter;
pub mod models;
pub mod remote;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{GuardError, UpstreamError};
pub use guard::UpstreamGuard;
pub use tasks::BackgroundTasks;
