//! Cache Module
//!
//! In-memory namespaced caching with TTL expiration and pluggable eviction
//! (LRU, LFU, FIFO), plus the tiered cache that puts it in front of a remote store.

mod entry;
mod fifo;
mod lfu;
mod lru;
mod memory;
mod policy;
mod stats;
mod store;
mod tiered;


// Re-export public types
pub use entry::{approximate_size, current_timestamp_ms, CacheEntry};
pub use fifo::FifoTracker;
pub use lfu::LfuTracker;
pub use lru::LruTracker;
pub use memory::{MemoryCache, MemoryCacheConfig};
pub use policy::{EvictionPolicy, EvictionTracker};
pub use stats::CacheStats;
pub use store::{NamespaceConfig, NamespaceStore};
pub use tiered::{CacheBackend, TieredCache, TieredCacheConfig};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
