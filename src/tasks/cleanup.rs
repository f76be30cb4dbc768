//! Maintenance Task
//!
//! Background task that periodically drops entries too old to serve even as
//! a stale fallback, and forgets idle rate-limit buckets.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::RefreshCoordinator;

/// Spawns a background task that periodically purges old cache entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between runs.
///
/// # Arguments
/// * `coordinator` - Coordinator owning the store and rate limiter
/// * `cleanup_interval_secs` - Interval in seconds between runs
/// * `retention_secs` - Age after which an entry is no longer kept
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_cleanup_task(
    coordinator: RefreshCoordinator,
    cleanup_interval_secs: u64,
    retention_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));
    let retention = chrono::Duration::try_seconds(
        i64::try_from(retention_secs).unwrap_or(i64::MAX),
    )
    .unwrap_or(chrono::Duration::MAX);

    tokio::spawn(async move {
        info!(
            "Starting maintenance task with interval of {} seconds, retention {} seconds",
            cleanup_interval_secs, retention_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match coordinator.purge(retention).await {
                Ok((0, 0)) => debug!("Maintenance: nothing to purge"),
                Ok((entries, buckets)) => info!(
                    "Maintenance: removed {} old entries and {} idle rate-limit buckets",
                    entries, buckets
                ),
                Err(e) => warn!("Maintenance failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    use crate::cache::{CacheEntry, CacheKey, CacheStore, MemoryStore};
    use crate::clock::SystemClock;
    use crate::config::Config;
    use crate::error::FetchError;
    use crate::upstream::{Fetched, UpstreamFetcher};

    struct NeverFetch;

    #[async_trait]
    impl UpstreamFetcher for NeverFetch {
        async fn fetch(&self, _key: &CacheKey) -> Result<Fetched, FetchError> {
            Err(FetchError::Upstream("not used".to_string()))
        }
    }

    fn coordinator(store: Arc<MemoryStore>) -> RefreshCoordinator {
        RefreshCoordinator::from_config(
            &Config::default(),
            store,
            Arc::new(NeverFetch),
            Arc::new(SystemClock),
        )
    }

    fn entry(key: &str, age: chrono::Duration) -> CacheEntry {
        CacheEntry::new(
            CacheKey::normalize(key).unwrap(),
            json!({"t": 1}),
            Utc::now() - age,
            300,
        )
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_old_entries() {
        let store = Arc::new(MemoryStore::new());
        store.put(entry("paris", chrono::Duration::hours(2))).await.unwrap();
        store.put(entry("berlin", chrono::Duration::seconds(0))).await.unwrap();

        let handle = spawn_cleanup_task(coordinator(store.clone()), 1, 3600);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store
            .get(&CacheKey::normalize("berlin").unwrap())
            .await
            .unwrap()
            .is_some());

        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let store = Arc::new(MemoryStore::new());
        let handle = spawn_cleanup_task(coordinator(store), 1, 3600);

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
