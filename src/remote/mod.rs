//! Remote Cache Module
//!
//! Second cache tier backed by an out-of-process key-value store (Redis).

mod adapter;
mod store;

#[cfg(test)]
pub(crate) mod mock;

pub use adapter::RemoteCache;
pub use store::{KeyValueStore, RedisStore};
pub(crate) use store::redact_url;
