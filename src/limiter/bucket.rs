//! # Token-Bucket Admission Controller
//!
//! One bucket per [`OperationCategory`]. Buckets refill lazily when a token is
//! requested, so there is no timer per bucket.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::RateLimited;
use crate::limiter::OperationCategory;

/// Window used for the per-bucket request rate in metrics.
const RECENT_WINDOW: Duration = Duration::from_secs(60);

/// Steady rate and burst allowance of one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryLimit {
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl CategoryLimit {
    pub const fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            burst_size,
        }
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.requests_per_minute as f64 / 60.0
    }

    pub fn default_for(category: OperationCategory) -> Self {
        match category {
            OperationCategory::Read => Self::new(120, 20),
            OperationCategory::Create | OperationCategory::Update => Self::new(60, 10),
            OperationCategory::Delete => Self::new(30, 5),
            OperationCategory::Batch => Self::new(10, 2),
            OperationCategory::Admin => Self::new(30, 5),
        }
    }
}

/// Token bucket state for one category.
#[derive(Debug)]
pub struct TokenBucket {
    category: OperationCategory,
    limit: CategoryLimit,
    /// Current number of tokens
    tokens: f64,
    /// Last refill timestamp
    last_refill: Instant,
    /// Admissions within the last minute, oldest first
    recent_requests: VecDeque<Instant>,
    granted: u64,
    rejected: u64,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(category: OperationCategory, limit: CategoryLimit) -> Self {
        Self {
            category,
            limit,
            tokens: limit.burst_size as f64,
            last_refill: Instant::now(),
            recent_requests: VecDeque::new(),
            granted: 0,
            rejected: 0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let capacity = self.limit.burst_size as f64;
        self.tokens = (self.tokens + elapsed * self.limit.refill_rate()).min(capacity);
        self.last_refill = now;
    }

    fn trim_recent(&mut self, now: Instant) {
        while let Some(front) = self.recent_requests.front() {
            if now.saturating_duration_since(*front) >= RECENT_WINDOW {
                self.recent_requests.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take one token, or return how long until one is available.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        self.refill(now);
        self.trim_recent(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            self.granted += 1;
            self.recent_requests.push_back(now);
            return Ok(());
        }

        self.rejected += 1;
        Err(self.time_until_token())
    }

    fn time_until_token(&self) -> Duration {
        let rate = self.limit.refill_rate();
        if rate <= 0.0 {
            // Never refills; report a full minute so waiters back off.
            return RECENT_WINDOW;
        }
        let missing = (1.0 - self.tokens).max(0.0);
        Duration::from_secs_f64(missing / rate)
    }

    /// Tokens after a lazy refill.
    pub fn available(&mut self) -> f64 {
        self.refill(Instant::now());
        self.tokens
    }

    pub fn category(&self) -> OperationCategory {
        self.category
    }

    pub fn limit(&self) -> CategoryLimit {
        self.limit
    }

    fn metrics(&mut self) -> BucketMetrics {
        let now = Instant::now();
        self.refill(now);
        self.trim_recent(now);
        BucketMetrics {
            tokens_available: self.tokens,
            burst_size: self.limit.burst_size,
            requests_per_minute: self.limit.requests_per_minute,
            requests_last_minute: self.recent_requests.len(),
            granted: self.granted,
            rejected: self.rejected,
        }
    }
}

/// Metrics of one category's bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketMetrics {
    pub tokens_available: f64,
    pub burst_size: u32,
    pub requests_per_minute: u32,
    pub requests_last_minute: usize,
    pub granted: u64,
    pub rejected: u64,
}

/// Per-category token buckets in front of the upstream.
#[derive(Debug)]
pub struct AdmissionController {
    limits: BTreeMap<OperationCategory, CategoryLimit>,
    buckets: Mutex<HashMap<OperationCategory, TokenBucket>>,
}

impl AdmissionController {
    /// Controller with the default limit for every category.
    pub fn new() -> Self {
        Self::with_limits(BTreeMap::new())
    }

    /// Controller with explicit limits; missing categories use their default.
    pub fn with_limits(overrides: BTreeMap<OperationCategory, CategoryLimit>) -> Self {
        let limits: BTreeMap<_, _> = OperationCategory::ALL
            .iter()
            .map(|&category| {
                let limit = overrides
                    .get(&category)
                    .copied()
                    .unwrap_or_else(|| CategoryLimit::default_for(category));
                (category, limit)
            })
            .collect();
        let buckets = limits
            .iter()
            .map(|(&category, &limit)| (category, TokenBucket::new(category, limit)))
            .collect();

        Self {
            limits,
            buckets: Mutex::new(buckets),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationCategory, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a token for `operation` without waiting.
    pub fn acquire(&self, operation: &str) -> Result<(), RateLimited> {
        let category = OperationCategory::classify(operation);
        let mut buckets = self.lock();
        let bucket = buckets
            .entry(category)
            .or_insert_with(|| TokenBucket::new(category, CategoryLimit::default_for(category)));

        bucket.try_acquire().map_err(|retry_after| {
            debug!(
                operation,
                category = %category,
                retry_after_ms = retry_after.as_millis() as u64,
                "Admission denied"
            );
            RateLimited {
                category,
                retry_after,
            }
        })
    }

    /// Sleep until a token for `operation` is available, then take it.
    pub async fn wait_and_acquire(&self, operation: &str) {
        loop {
            match self.acquire(operation) {
                Ok(()) => return,
                Err(limited) => {
                    // Floor the delay so float rounding cannot spin.
                    let delay = limited.retry_after.max(Duration::from_millis(1));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Per-category bucket metrics.
    pub fn metrics(&self) -> BTreeMap<OperationCategory, BucketMetrics> {
        self.lock()
            .iter_mut()
            .map(|(&category, bucket)| (category, bucket.metrics()))
            .collect()
    }

    /// Configured limits per category.
    pub fn limits(&self) -> BTreeMap<OperationCategory, CategoryLimit> {
        self.limits.clone()
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new()
    }
}
