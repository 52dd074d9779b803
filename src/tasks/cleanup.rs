//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from every
//! namespace, so cold keys do not hold memory until their next access.

use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryCache;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The first sweep runs one `interval` after spawning. The returned handle
/// aborts the task; see [`BackgroundTasks`](crate::tasks::BackgroundTasks).
pub fn spawn_sweep_task<V>(cache: MemoryCache<V>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Serialize + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting cache expiry sweep task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.cleanup_expired().await;
            if removed > 0 {
                info!(removed, "Cache sweep removed expired entries");
            } else {
                debug!("Cache sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheConfig;

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let cache: MemoryCache<String> = MemoryCache::new(MemoryCacheConfig::default());
        cache
            .set("contacts", "expire_soon", "value".into(), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        cache
            .set("contacts", "long_lived", "value".into(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        let handle = spawn_sweep_task(cache.clone(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Removed by the sweep, not by a lazy read.
        let stats = cache.stats(Some("contacts")).await;
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.misses, 0);
        assert!(cache.has("contacts", "long_lived").await);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let cache: MemoryCache<String> = MemoryCache::new(MemoryCacheConfig::default());

        let handle = spawn_sweep_task(cache, Duration::from_secs(1));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
