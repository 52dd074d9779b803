//! # Queueing Rate Limiter
//!
//! A single FIFO of upstream calls drained by one task at a time. The drain
//! paces calls once the trailing hour approaches the budget and retries
//! transient failures with exponential backoff.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::UpstreamError;

const HOUR: Duration = Duration::from_secs(3600);

/// Fraction of the hourly budget after which calls are spaced out.
const THROTTLE_RATIO: f64 = 0.9;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub requests_per_hour: u32,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// Upper bound for a single backoff sleep
    pub max_backoff: Duration,
}

impl RateLimiterConfig {
    /// Minimum spacing between calls when throttling.
    pub fn min_delay(&self) -> Duration {
        HOUR / self.requests_per_hour.max(1)
    }

    /// Backoff before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = Duration::from_millis(1000u64.saturating_mul(1u64 << exponent));
        delay.min(self.max_backoff)
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_hour: 1000,
            max_retries: 3,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Snapshot of queue activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueMetrics {
    pub total_requests: u64,
    pub requests_last_hour: usize,
    pub average_duration_ms: f64,
    pub queue_length: usize,
    pub requests_per_hour: u32,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    last_request_at: Option<Instant>,
    /// Start times of calls in the trailing hour, oldest first
    window: VecDeque<Instant>,
    total_requests: u64,
    total_duration: Duration,
    completed: u64,
}

impl Bookkeeping {
    fn trim(&mut self, now: Instant) {
        while let Some(front) = self.window.front() {
            if now.saturating_duration_since(*front) >= HOUR {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

struct Inner {
    config: RateLimiterConfig,
    queue: Mutex<VecDeque<Job>>,
    book: Mutex<Bookkeeping>,
    draining: AtomicBool,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn book(&self) -> MutexGuard<'_, Bookkeeping> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = self.queue().pop_front();
            match next {
                Some(job) => {
                    // A panicking transport call must not take the drain loop down with it.
                    if let Err(e) = tokio::spawn(job).await {
                        warn!(error = %e, "Queued upstream call panicked");
                    }
                }
                None => {
                    self.draining.store(false, Ordering::Release);
                    // A job pushed between the pop and the store would otherwise wait forever.
                    if self.queue().is_empty() || !self.claim_drain() {
                        return;
                    }
                }
            }
        }
    }

    fn claim_drain(&self) -> bool {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Sleep if the trailing hour is close to the budget.
    async fn pace(&self, label: &str) {
        let delay = {
            let mut book = self.book();
            let now = Instant::now();
            book.trim(now);

            let threshold = self.config.requests_per_hour as f64 * THROTTLE_RATIO;
            if (book.window.len() as f64) < threshold {
                None
            } else {
                let since_last = book
                    .last_request_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(Duration::MAX);
                Some(self.config.min_delay().saturating_sub(since_last))
            }
        };

        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            debug!(
                operation = label,
                delay_ms = delay.as_millis() as u64,
                "Approaching hourly budget, throttling"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn record_start(&self) -> Instant {
        let now = Instant::now();
        let mut book = self.book();
        book.last_request_at = Some(now);
        book.window.push_back(now);
        book.total_requests += 1;
        now
    }

    fn record_finish(&self, started: Instant) {
        let mut book = self.book();
        book.total_duration += started.elapsed();
        book.completed += 1;
    }

    /// Runs `op` with pacing and retries until it succeeds, fails for good,
    /// or `abandoned` reports that nobody is waiting for the result.
    async fn run<F, Fut, T, A>(
        &self,
        label: &str,
        max_retries: u32,
        mut op: F,
        abandoned: A,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
        A: Fn() -> bool,
    {
        let mut attempt = 0u32;
        loop {
            self.pace(label).await;
            if abandoned() {
                debug!(operation = label, attempt, "Caller gone, skipping queued call");
                return Err(UpstreamError::Cancelled);
            }
            let started = self.record_start();
            let result = op().await;
            self.record_finish(started);

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    let backoff = self.config.backoff(attempt);
                    warn!(
                        operation = label,
                        attempt,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient upstream failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Global FIFO in front of the upstream. Cloning shares the queue.
#[derive(Clone)]
pub struct QueueingRateLimiter {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueueingRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueingRateLimiter")
            .field("config", &self.inner.config)
            .field("queue_length", &self.inner.queue().len())
            .field("draining", &self.inner.draining.load(Ordering::Relaxed))
            .finish()
    }
}

impl QueueingRateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queue: Mutex::new(VecDeque::new()),
                book: Mutex::new(Bookkeeping::default()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.inner.config
    }

    /// Queue `op` and wait for its result.
    ///
    /// `op` is called once per attempt; `retries` overrides the configured
    /// retry count for this call. Must be called from within a tokio runtime.
    pub async fn enqueue<F, Fut, T>(
        &self,
        label: impl Into<String>,
        retries: Option<u32>,
        op: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let max_retries = retries.unwrap_or(self.inner.config.max_retries);
        let (tx, rx) = oneshot::channel();

        let inner = Arc::clone(&self.inner);
        let job: Job = Box::pin(async move {
            let result = inner
                .run(&label, max_retries, op, || tx.is_closed())
                .await;
            // The caller may have given up waiting.
            let _ = tx.send(result);
        });

        self.inner.queue().push_back(job);
        if self.inner.claim_drain() {
            tokio::spawn(Arc::clone(&self.inner).drain());
        }

        rx.await.unwrap_or(Err(UpstreamError::Cancelled))
    }

    pub fn queue_length(&self) -> usize {
        self.inner.queue().len()
    }

    pub fn metrics(&self) -> QueueMetrics {
        let queue_length = self.queue_length();
        let mut book = self.inner.book();
        book.trim(Instant::now());

        let average_duration_ms = if book.completed == 0 {
            0.0
        } else {
            book.total_duration.as_secs_f64() * 1000.0 / book.completed as f64
        };

        QueueMetrics {
            total_requests: book.total_requests,
            requests_last_hour: book.window.len(),
            average_duration_ms,
            queue_length,
            requests_per_hour: self.inner.config.requests_per_hour,
        }
    }
}

impl Default for QueueingRateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}
