//! Circuit Breaker Module
//!
//! Per-target failure isolation for calls to the upstream service. Breakers are
//! independent of caching and rate limiting and wrap any async operation.

mod circuit;
mod config;
mod events;
mod history;
mod registry;

pub use circuit::{BreakerMetrics, CircuitBreaker, CircuitState};
pub use config::{CircuitBreakerConfig, ErrorFilter};
pub use events::{BreakerEvent, EVENT_CHANNEL_CAPACITY};
pub use history::{RequestHistory, RequestRecord};
pub use registry::CircuitBreakerRegistry;
