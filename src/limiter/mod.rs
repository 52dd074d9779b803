//! Rate Limiting Module
//!
//! Two independent admission mechanisms that are composed by the guard:
//! per-category token buckets that reject or delay a call before anything
//! else happens, and a global queue that paces calls against an hourly budget
//! and retries transient failures.

mod bucket;
mod category;
mod queue;

pub use bucket::{AdmissionController, BucketMetrics, CategoryLimit, TokenBucket};
pub use category::OperationCategory;
pub use queue::{QueueMetrics, QueueingRateLimiter, RateLimiterConfig};
