//! Circuit breaker configuration.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::UpstreamError;

/// Decides whether an operation error counts toward opening the circuit.
pub type ErrorFilter = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Configuration for one circuit breaker.
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Percentage failure rate over the history that opens the circuit; also
    /// the consecutive-failure count that opens it
    pub failure_threshold: u32,
    /// Successful probes needed to close from half-open
    pub success_threshold: u32,
    /// Deadline for a single call
    pub timeout: Duration,
    /// How long the circuit stays open before allowing a probe
    pub reset_timeout: Duration,
    /// Minimum requests in the history before the circuit may open
    pub volume_threshold: u32,
    /// Concurrent probe calls allowed while half-open
    pub max_half_open_requests: u32,
    /// Age limit of the request history
    pub history_window: Duration,
    /// Size limit of the request history
    pub history_capacity: usize,
    /// Which errors count as failures; `None` counts everything
    pub error_filter: Option<ErrorFilter>,
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    pub fn with_volume_threshold(mut self, volume: u32) -> Self {
        self.volume_threshold = volume;
        self
    }

    pub fn with_max_half_open_requests(mut self, max: u32) -> Self {
        self.max_half_open_requests = max.max(1);
        self
    }

    pub fn with_error_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.error_filter = Some(Arc::new(filter));
        self
    }

    /// Counts only server-side faults (network, timeouts, 5xx) of an
    /// [`UpstreamError`]; client errors pass through without affecting the circuit.
    /// Errors of any other type are counted.
    pub fn counting_server_faults(self) -> Self {
        self.with_error_filter(|err| {
            err.downcast_ref::<UpstreamError>()
                .map(UpstreamError::is_server_fault)
                .unwrap_or(true)
        })
    }

    /// Whether `err` counts toward opening the circuit.
    pub fn counts_as_failure(&self, err: &(dyn Error + 'static)) -> bool {
        match &self.error_filter {
            Some(filter) => filter(err),
            None => true,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 50,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(60),
            volume_threshold: 10,
            max_half_open_requests: 1,
            history_window: Duration::from_secs(5 * 60),
            history_capacity: 100,
            error_filter: None,
        }
    }
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("timeout", &self.timeout)
            .field("reset_timeout", &self.reset_timeout)
            .field("volume_threshold", &self.volume_threshold)
            .field("max_half_open_requests", &self.max_half_open_requests)
            .field("history_window", &self.history_window)
            .field("history_capacity", &self.history_capacity)
            .field("error_filter", &self.error_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 50);
        assert_eq!(config.max_half_open_requests, 1);
        assert_eq!(config.history_window, Duration::from_secs(300));
        assert_eq!(config.history_capacity, 100);
        assert!(config.error_filter.is_none());
    }

    #[test]
    fn test_server_fault_filter() {
        let config = CircuitBreakerConfig::new().counting_server_faults();

        let client = UpstreamError::Status {
            status: 404,
            message: "missing".into(),
        };
        let server = UpstreamError::Status {
            status: 500,
            message: "boom".into(),
        };
        let other = std::io::Error::new(std::io::ErrorKind::Other, "io");

        assert!(!config.counts_as_failure(&client));
        assert!(config.counts_as_failure(&server));
        assert!(config.counts_as_failure(&other));
    }

    #[test]
    fn test_half_open_minimum_is_one() {
        let config = CircuitBreakerConfig::new().with_max_half_open_requests(0);
        assert_eq!(config.max_half_open_requests, 1);
    }
}
