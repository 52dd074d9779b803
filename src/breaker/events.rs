//! Breaker notifications delivered over a broadcast channel.

use crate::breaker::{BreakerMetrics, CircuitState};

/// Capacity of the breaker event channel; slow subscribers see `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something observable happened to a breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// State transition, including manual overrides (`forced`)
    StateChanged {
        target: String,
        from: CircuitState,
        to: CircuitState,
        forced: bool,
    },
    /// A call was turned away without running
    Rejected { target: String, state: CircuitState },
    /// Periodic metrics snapshot
    Metrics(BreakerMetrics),
}

impl BreakerEvent {
    /// Name of the breaker the event is about.
    pub fn target(&self) -> &str {
        match self {
            BreakerEvent::StateChanged { target, .. } | BreakerEvent::Rejected { target, .. } => {
                target
            }
            BreakerEvent::Metrics(metrics) => &metrics.name,
        }
    }
}
