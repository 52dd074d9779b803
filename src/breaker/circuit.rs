//! # Circuit Breaker Implementation
//!
//! Per-target fault isolation with three states: Closed (normal operation),
//! Open (failing fast) and Half-Open (a bounded number of probe calls test
//! recovery).
//!
//! The record is guarded by a synchronous mutex that is never held across an
//! `.await`; the protected operation runs outside the lock.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::breaker::events::EVENT_CHANNEL_CAPACITY;
use crate::breaker::{BreakerEvent, CircuitBreakerConfig, RequestHistory};
use crate::error::BreakerError;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a breaker for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u64,
    pub success_count: u64,
    pub consecutive_failures: u64,
    pub total_requests: u64,
    pub rejected_requests: u64,
    pub timeouts: u64,
    pub failure_rate: f64,
    pub average_response_time_ms: f64,
    pub history_size: usize,
    pub half_open_in_flight: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerRecord {
    state: CircuitState,
    failure_count: u64,
    success_count: u64,
    consecutive_failures: u64,
    half_open_successes: u32,
    half_open_in_flight: u32,
    total_requests: u64,
    rejected_requests: u64,
    timeouts: u64,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    next_attempt_at: Option<Instant>,
    next_attempt_wall: Option<DateTime<Utc>>,
    history: RequestHistory,
}

impl BreakerRecord {
    fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            total_requests: 0,
            rejected_requests: 0,
            timeouts: 0,
            last_failure_at: None,
            last_success_at: None,
            next_attempt_at: None,
            next_attempt_wall: None,
            history: RequestHistory::new(config.history_window, config.history_capacity),
        }
    }
}

/// Why a call was not admitted.
enum Rejection {
    Open { retry_after: Duration },
    HalfOpenSaturated,
}

/// Releases a half-open probe slot if the call is dropped before it reports.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl ProbeSlot<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut record = self.breaker.lock();
            record.half_open_in_flight = record.half_open_in_flight.saturating_sub(1);
            debug!(component = %self.breaker.name, "half-open probe abandoned");
        }
    }
}

/// Failure-isolating wrapper around calls to one named target.
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,
    config: CircuitBreakerConfig,
    record: Mutex<BreakerRecord>,
    events: broadcast::Sender<BreakerEvent>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a breaker with its own event channel.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(name, config, events)
    }

    /// Create a breaker publishing to a shared event channel.
    pub fn with_events(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        events: broadcast::Sender<BreakerEvent>,
    ) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            volume_threshold = config.volume_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            record: Mutex::new(BreakerRecord::new(&config)),
            name,
            config,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Subscribe to this breaker's events.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// The operation runs under `config.timeout`; a timeout counts as a
    /// failure but the operation's future is only dropped, not otherwise
    /// cancelled. Errors rejected by the error filter are re-raised without
    /// affecting the circuit.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
    {
        let is_probe = match self.admit() {
            Ok(is_probe) => is_probe,
            Err(Rejection::Open { retry_after }) => {
                return Err(BreakerError::Open {
                    target: self.name.clone(),
                    retry_after,
                })
            }
            Err(Rejection::HalfOpenSaturated) => {
                return Err(BreakerError::HalfOpenSaturated {
                    target: self.name.clone(),
                })
            }
        };
        let mut slot = ProbeSlot {
            breaker: self,
            armed: is_probe,
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.timeout, operation()).await;
        let elapsed = started.elapsed();
        slot.disarm();

        match outcome {
            Ok(Ok(value)) => {
                self.record_success(is_probe, elapsed);
                Ok(value)
            }
            Ok(Err(err)) => {
                if self.config.counts_as_failure(&err) {
                    self.record_failure(is_probe, elapsed, false);
                } else {
                    self.record_ignored(is_probe);
                }
                Err(BreakerError::Operation(err))
            }
            Err(_) => {
                self.record_failure(is_probe, elapsed, true);
                Err(BreakerError::Timeout {
                    target: self.name.clone(),
                    timeout: self.config.timeout,
                })
            }
        }
    }

    /// Like [`execute`](Self::execute), but a rejected call (open, or half-open
    /// at capacity) is answered by `fallback` instead of an error.
    pub async fn execute_with_fallback<F, Fut, T, E, FB, FbFut>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + 'static,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
    {
        match self.execute(operation).await {
            Err(err) if err.is_rejection() => {
                debug!(component = %self.name, "routing rejected call to fallback");
                Ok(fallback().await)
            }
            other => other,
        }
    }

    /// Check whether a call may proceed; returns whether it is a half-open probe.
    fn admit(&self) -> Result<bool, Rejection> {
        let mut record = self.lock();
        let now = Instant::now();

        if record.state == CircuitState::Open {
            match record.next_attempt_at {
                Some(next) if now < next => {
                    record.rejected_requests += 1;
                    self.emit(BreakerEvent::Rejected {
                        target: self.name.clone(),
                        state: CircuitState::Open,
                    });
                    return Err(Rejection::Open {
                        retry_after: next - now,
                    });
                }
                _ => self.transition(&mut record, CircuitState::HalfOpen, false),
            }
        }

        if record.state == CircuitState::HalfOpen {
            if record.half_open_in_flight >= self.config.max_half_open_requests {
                record.rejected_requests += 1;
                self.emit(BreakerEvent::Rejected {
                    target: self.name.clone(),
                    state: CircuitState::HalfOpen,
                });
                return Err(Rejection::HalfOpenSaturated);
            }
            record.half_open_in_flight += 1;
            record.total_requests += 1;
            return Ok(true);
        }

        record.total_requests += 1;
        Ok(false)
    }

    fn release_probe(record: &mut BreakerRecord, is_probe: bool) {
        if is_probe {
            record.half_open_in_flight = record.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Record a successful operation
    fn record_success(&self, is_probe: bool, duration: Duration) {
        let mut record = self.lock();
        Self::release_probe(&mut record, is_probe);

        record.success_count += 1;
        record.consecutive_failures = 0;
        record.last_success_at = Some(Utc::now());
        record.history.push(true, duration);

        debug!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            "Operation succeeded"
        );

        // Only probes decide recovery; a call admitted while closed may finish late.
        if is_probe && record.state == CircuitState::HalfOpen {
            record.half_open_successes += 1;
            if record.half_open_successes >= self.config.success_threshold {
                self.transition(&mut record, CircuitState::Closed, false);
            }
        }
    }

    /// Record a failed operation
    fn record_failure(&self, is_probe: bool, duration: Duration, timed_out: bool) {
        let mut record = self.lock();
        Self::release_probe(&mut record, is_probe);

        record.failure_count += 1;
        record.consecutive_failures += 1;
        record.last_failure_at = Some(Utc::now());
        if timed_out {
            record.timeouts += 1;
        }
        record.history.push(false, duration);

        warn!(
            component = %self.name,
            duration_ms = duration.as_millis() as u64,
            timed_out,
            consecutive_failures = record.consecutive_failures,
            "Operation failed"
        );

        match record.state {
            CircuitState::HalfOpen if is_probe => {
                // Any probe failure in half-open state immediately opens circuit
                self.transition(&mut record, CircuitState::Open, false);
            }
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                if self.should_open(&record) {
                    self.transition(&mut record, CircuitState::Open, false);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// An error the filter does not count: only the probe slot is released.
    fn record_ignored(&self, is_probe: bool) {
        let mut record = self.lock();
        Self::release_probe(&mut record, is_probe);
        debug!(component = %self.name, "Operation error excluded by filter");
    }

    fn should_open(&self, record: &BreakerRecord) -> bool {
        if (record.history.len() as u64) < self.config.volume_threshold as u64 {
            return false;
        }
        let rate_threshold = self.config.failure_threshold as f64 / 100.0;
        record.history.failure_rate() >= rate_threshold
            || record.consecutive_failures >= self.config.failure_threshold as u64
    }

    fn transition(&self, record: &mut BreakerRecord, to: CircuitState, forced: bool) {
        let from = record.state;
        record.state = to;
        record.half_open_in_flight = 0;
        record.half_open_successes = 0;

        match to {
            CircuitState::Open => {
                record.next_attempt_at = Some(Instant::now() + self.config.reset_timeout);
                record.next_attempt_wall = chrono::Duration::from_std(self.config.reset_timeout)
                    .ok()
                    .map(|reset| Utc::now() + reset);
                error!(
                    component = %self.name,
                    from = %from,
                    forced,
                    consecutive_failures = record.consecutive_failures,
                    failure_rate = record.history.failure_rate(),
                    reset_timeout_ms = self.config.reset_timeout.as_millis() as u64,
                    "Circuit breaker opened (failing fast)"
                );
            }
            CircuitState::HalfOpen => {
                record.next_attempt_at = None;
                record.next_attempt_wall = None;
                info!(
                    component = %self.name,
                    success_threshold = self.config.success_threshold,
                    "Circuit breaker half-open (testing recovery)"
                );
            }
            CircuitState::Closed => {
                record.failure_count = 0;
                record.success_count = 0;
                record.consecutive_failures = 0;
                record.next_attempt_at = None;
                record.next_attempt_wall = None;
                record.history.clear();
                info!(
                    component = %self.name,
                    from = %from,
                    forced,
                    total_requests = record.total_requests,
                    "Circuit breaker closed"
                );
            }
        }

        self.emit(BreakerEvent::StateChanged {
            target: self.name.clone(),
            from,
            to,
            forced,
        });
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let mut record = self.lock();
        self.transition(&mut record, CircuitState::Open, true);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let mut record = self.lock();
        self.transition(&mut record, CircuitState::Closed, true);
    }

    /// Closed state with every counter, including totals, back at zero.
    pub fn reset(&self) {
        warn!(component = %self.name, "Circuit breaker reset");
        let mut record = self.lock();
        self.transition(&mut record, CircuitState::Closed, true);
        record.total_requests = 0;
        record.rejected_requests = 0;
        record.timeouts = 0;
        record.last_failure_at = None;
        record.last_success_at = None;
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> BreakerMetrics {
        let mut record = self.lock();
        record.history.trim(Instant::now());

        BreakerMetrics {
            name: self.name.clone(),
            state: record.state,
            failure_count: record.failure_count,
            success_count: record.success_count,
            consecutive_failures: record.consecutive_failures,
            total_requests: record.total_requests,
            rejected_requests: record.rejected_requests,
            timeouts: record.timeouts,
            failure_rate: record.history.failure_rate(),
            average_response_time_ms: record.history.average_duration().as_secs_f64() * 1000.0,
            history_size: record.history.len(),
            half_open_in_flight: record.half_open_in_flight,
            last_failure_at: record.last_failure_at,
            last_success_at: record.last_success_at,
            next_attempt_at: record.next_attempt_wall,
        }
    }

    /// Publish a metrics snapshot to subscribers.
    pub fn emit_metrics(&self) {
        self.emit(BreakerEvent::Metrics(self.metrics()));
    }

    fn emit(&self, event: BreakerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
