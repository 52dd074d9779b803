//! Error types for the resilience layer
//!
//! Provides unified error handling using thiserror. Each concern (cache,
//! remote store, upstream transport, breaker, admission) has its own error
//! type; `GuardError` is what the composed pipeline hands back to the gateway.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::limiter::OperationCategory;

// == Cache Error Enum ==
/// Errors raised by the local and tiered caches.
///
/// Reads never produce these; only writes on the authoritative tier do.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid key or value
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Entry can never fit in its namespace budget
    #[error("Entry too large: {size} bytes exceeds namespace budget of {max} bytes")]
    EntryTooLarge { size: usize, max: usize },

    /// Unknown namespace or key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote tier write failed
    #[error("Remote cache error: {0}")]
    Remote(#[from] StoreError),

    /// Value could not be encoded for the remote tier
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == Store Error Enum ==
/// Errors raised by the external key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the store
    #[error("connection error: {0}")]
    Connection(String),

    /// The store rejected or failed a command
    #[error("command error: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Result type for key-value store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Upstream Error Enum ==
/// Failure of a call to the upstream HTTP service, as classified by the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Network-level failure (DNS, refused, reset)
    #[error("network error: {0}")]
    Network(String),

    /// Connection aborted mid-request
    #[error("connection aborted: {0}")]
    ConnectionAborted(String),

    /// The transport gave up waiting
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a non-success status
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The queued call was dropped before it produced a result
    #[error("request cancelled before completion")]
    Cancelled,
}

impl UpstreamError {
    /// Transient failures worth retrying: network, aborts, timeouts, 5xx and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Network(_)
            | UpstreamError::ConnectionAborted(_)
            | UpstreamError::Timeout(_) => true,
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Cancelled => false,
        }
    }

    /// Failures that say something about upstream health (everything but 4xx).
    pub fn is_server_fault(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status >= 500,
            UpstreamError::Cancelled => false,
            _ => true,
        }
    }

    /// Returns the HTTP status, if the upstream answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// == Breaker Error Enum ==
/// Outcome of a call rejected or failed under circuit breaker protection.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Circuit is open, calls fail fast
    #[error("Circuit breaker is open for {target}, retry after {retry_after:?}")]
    Open { target: String, retry_after: Duration },

    /// Circuit is half-open and the probe slots are taken
    #[error("Circuit breaker for {target} is half-open and at probe capacity")]
    HalfOpenSaturated { target: String },

    /// The call exceeded the breaker deadline
    #[error("Call to {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    /// The operation's own error, re-raised
    #[error("Operation failed: {0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True for capacity rejections (the operation never ran).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BreakerError::Open { .. } | BreakerError::HalfOpenSaturated { .. }
        )
    }
}

// == Rate Limited ==
/// A token bucket had no token for this call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Rate limit exceeded for {category} operations, retry after {retry_after:?}")]
pub struct RateLimited {
    pub category: OperationCategory,
    pub retry_after: Duration,
}

// == Guard Error Enum ==
/// Error returned by the composed pipeline.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Upstream failure after retries
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Circuit open for the target
    #[error("Circuit breaker is open for {target}")]
    CircuitOpen { target: String, retry_after: Duration },

    /// Half-open probe capacity reached
    #[error("Circuit breaker for {target} is half-open and at probe capacity")]
    HalfOpenSaturated { target: String },

    /// Breaker deadline exceeded
    #[error("Call to {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    /// Token bucket exhausted
    #[error(transparent)]
    RateLimited(#[from] RateLimited),

    /// Authoritative cache write failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<BreakerError<UpstreamError>> for GuardError {
    fn from(err: BreakerError<UpstreamError>) -> Self {
        match err {
            BreakerError::Open {
                target,
                retry_after,
            } => GuardError::CircuitOpen {
                target,
                retry_after,
            },
            BreakerError::HalfOpenSaturated { target } => GuardError::HalfOpenSaturated { target },
            BreakerError::Timeout { target, timeout } => GuardError::Timeout { target, timeout },
            BreakerError::Operation(err) => GuardError::Upstream(err),
        }
    }
}

// == IntoResponse Implementations ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) | CacheError::EntryTooLarge { .. } => {
                StatusCode::BAD_REQUEST
            }
            CacheError::Remote(_) => StatusCode::BAD_GATEWAY,
            CacheError::Serialization(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let status = match &self {
            GuardError::CircuitOpen { .. } | GuardError::HalfOpenSaturated { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GuardError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GuardError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GuardError::Upstream(err) => match err.status() {
                Some(code) if (400..500).contains(&code) => {
                    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            GuardError::Cache(err) => match err {
                CacheError::InvalidRequest(_) | CacheError::EntryTooLarge { .. } => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(UpstreamError::Network("reset".into()).is_retryable());
        assert!(UpstreamError::ConnectionAborted("eof".into()).is_retryable());
        assert!(UpstreamError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(UpstreamError::Status {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(UpstreamError::Status {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!UpstreamError::Status {
            status: 404,
            message: "missing".into()
        }
        .is_retryable());
        assert!(!UpstreamError::Cancelled.is_retryable());
    }

    #[test]
    fn test_server_fault_excludes_client_errors() {
        let client = UpstreamError::Status {
            status: 400,
            message: "bad".into(),
        };
        let server = UpstreamError::Status {
            status: 502,
            message: "bad gateway".into(),
        };
        assert!(!client.is_server_fault());
        assert!(server.is_server_fault());
        assert!(UpstreamError::Network("down".into()).is_server_fault());
    }

    #[test]
    fn test_breaker_error_maps_to_guard_error() {
        let err: GuardError = BreakerError::<UpstreamError>::Open {
            target: "contacts".into(),
            retry_after: Duration::from_secs(5),
        }
        .into();
        assert!(matches!(err, GuardError::CircuitOpen { .. }));

        let err: GuardError = BreakerError::Operation(UpstreamError::Cancelled).into();
        assert!(matches!(err, GuardError::Upstream(UpstreamError::Cancelled)));
    }

    #[test]
    fn test_guard_error_status_codes() {
        let resp = GuardError::RateLimited(RateLimited {
            category: OperationCategory::Read,
            retry_after: Duration::from_millis(500),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

        let resp = GuardError::CircuitOpen {
            target: "deals".into(),
            retry_after: Duration::ZERO,
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = GuardError::Upstream(UpstreamError::Status {
            status: 422,
            message: "invalid".into(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
