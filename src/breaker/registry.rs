//! One breaker per named target, created on first use.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::info;

use crate::breaker::events::EVENT_CHANNEL_CAPACITY;
use crate::breaker::{BreakerEvent, BreakerMetrics, CircuitBreaker, CircuitBreakerConfig};

/// Owns the breakers of one gateway; all of them publish to one event channel.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: RwLock<HashMap<String, CircuitBreakerConfig>>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    events: broadcast::Sender<BreakerEvent>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            defaults,
            overrides: RwLock::new(HashMap::new()),
            breakers: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Use `config` for `target` instead of the defaults. Only affects a
    /// breaker that has not been created yet.
    pub fn configure(&self, target: impl Into<String>, config: CircuitBreakerConfig) {
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.into(), config);
    }

    /// The breaker for `target`, created with its configuration on first use.
    pub fn get(&self, target: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get_existing(target) {
            return existing;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have created it between the two locks.
        if let Some(existing) = breakers.get(target) {
            return Arc::clone(existing);
        }

        let config = self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone());
        let breaker = Arc::new(CircuitBreaker::with_events(
            target,
            config,
            self.events.clone(),
        ));
        breakers.insert(target.to_string(), Arc::clone(&breaker));
        breaker
    }

    pub fn get_existing(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target)
            .cloned()
    }

    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Metrics of every breaker, ordered by name.
    pub fn all_metrics(&self) -> Vec<BreakerMetrics> {
        let mut metrics: Vec<_> = self.snapshot().iter().map(|cb| cb.metrics()).collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        metrics
    }

    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        info!(count = breakers.len(), "Resetting all circuit breakers");
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Publish a metrics snapshot for every breaker.
    pub fn emit_metrics(&self) {
        for breaker in self.snapshot() {
            breaker.emit_metrics();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.breakers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
