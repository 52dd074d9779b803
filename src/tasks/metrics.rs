//! Breaker Metrics Task
//!
//! Periodically publishes a metrics snapshot of every breaker on the
//! registry's event channel and logs open circuits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::breaker::{CircuitBreakerRegistry, CircuitState};

pub fn spawn_breaker_metrics_task(
    registry: Arc<CircuitBreakerRegistry>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting breaker metrics task"
        );

        loop {
            tokio::time::sleep(interval).await;

            registry.emit_metrics();
            for metrics in registry.all_metrics() {
                if metrics.state == CircuitState::Closed {
                    debug!(
                        component = %metrics.name,
                        failure_rate = metrics.failure_rate,
                        average_response_time_ms = metrics.average_response_time_ms,
                        "Breaker metrics"
                    );
                } else {
                    warn!(
                        component = %metrics.name,
                        state = %metrics.state,
                        rejected_requests = metrics.rejected_requests,
                        "Breaker not closed"
                    );
                }
            }
        }
    })
}

/// Logs every breaker event until the channel closes.
///
/// Stands in for a metrics sink; the gateway may subscribe its own consumers.
pub fn spawn_breaker_event_logger(registry: &CircuitBreakerRegistry) -> JoinHandle<()> {
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;

        loop {
            match events.recv().await {
                Ok(event) => debug!(component = %event.target(), ?event, "Breaker event"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Breaker event logger lagging")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
