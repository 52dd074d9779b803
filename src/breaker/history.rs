//! Bounded request history used for failure-rate and latency reporting.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of one call.
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord {
    pub success: bool,
    pub duration: Duration,
    pub at: Instant,
}

/// Ring of recent outcomes, limited by age and by count.
#[derive(Debug)]
pub struct RequestHistory {
    records: VecDeque<RequestRecord>,
    window: Duration,
    capacity: usize,
}

impl RequestHistory {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            window,
            capacity,
        }
    }

    pub fn push(&mut self, success: bool, duration: Duration) {
        let now = Instant::now();
        self.records.push_back(RequestRecord {
            success,
            duration,
            at: now,
        });
        self.trim(now);
    }

    /// Drops records older than the window and beyond the capacity.
    pub fn trim(&mut self, now: Instant) {
        while let Some(front) = self.records.front() {
            if now.saturating_duration_since(front.at) > self.window {
                self.records.pop_front();
            } else {
                break;
            }
        }
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fraction of failed records, 0 when empty.
    pub fn failure_rate(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let failures = self.records.iter().filter(|r| !r.success).count();
        failures as f64 / self.records.len() as f64
    }

    /// Mean duration over the history.
    pub fn average_duration(&self) -> Duration {
        if self.records.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.records.iter().map(|r| r.duration).sum();
        total / self.records.len() as u32
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
