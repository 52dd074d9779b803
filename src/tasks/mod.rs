//! Background Tasks Module
//!
//! Periodic work owned by the composition root.
//!
//! # Tasks
//! - Expiry sweep: removes expired cache entries at a fixed interval
//! - Breaker metrics: publishes breaker snapshots at a fixed interval
//! - Invalidation listener: drops L1 entries deleted by other instances (tiered only)
//! - Event logger: logs breaker events

mod cleanup;
mod metrics;

use tokio::task::JoinHandle;
use tracing::info;

pub use cleanup::spawn_sweep_task;
pub use metrics::{spawn_breaker_event_logger, spawn_breaker_metrics_task};

/// Owns the handles of running background tasks; dropping it aborts them.
#[derive(Debug, Default)]
pub struct BackgroundTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    /// Aborts every task and waits for them to finish.
    pub async fn shutdown(mut self) {
        for (name, handle) in self.handles.drain(..) {
            handle.abort();
            // Cancellation is the expected outcome.
            let _ = handle.await;
            info!(task = name, "Background task stopped");
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}
