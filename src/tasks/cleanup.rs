//! Maintenance Task
//!
//! Background task that periodically sweeps expired cache entries and prunes
//! idle lock mutexes.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheManager, CleanupReport};
use crate::lock::LockRegistry;

/// Runs one maintenance pass: cache cleanup plus `prune_idle` on every
/// registry. Returns the cache report and the number of pruned mutexes.
pub async fn run_maintenance(
    cache: &CacheManager,
    registries: &[LockRegistry],
) -> (CleanupReport, usize) {
    let report = cache.cleanup().await;
    let pruned: usize = registries.iter().map(LockRegistry::prune_idle).sum();

    let removed = report.memory_removed as u64 + report.durable_removed.unwrap_or(0);
    if removed > 0 || pruned > 0 {
        info!(
            "Maintenance: removed {} expired cache entries, pruned {} idle locks",
            removed, pruned
        );
    } else {
        debug!("Maintenance: nothing to clean up");
    }

    (report, pruned)
}

/// Spawns a background task that periodically runs `run_maintenance`.
///
/// # Arguments
/// * `cache` - Shared cache manager
/// * `registries` - Lock registries to prune
/// * `interval` - Time between passes
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(cache.clone(), state.registries(), Duration::from_secs(300));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(
    cache: Arc<CacheManager>,
    registries: Vec<LockRegistry>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting maintenance task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;
            run_maintenance(&cache, &registries).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheManager, SqliteTier, Tier};
    use crate::clock::ManualClock;
    use crate::db::Database;
    use serde_json::json;

    async fn test_cache(clock: Arc<ManualClock>) -> Arc<CacheManager> {
        let db = Database::open_in_memory().await.unwrap();
        db.init_schema().await.unwrap();
        Arc::new(CacheManager::with_clock(Arc::new(SqliteTier::new(db)), clock))
    }

    #[tokio::test]
    async fn test_maintenance_sweeps_both_tiers_and_prunes_locks() {
        let clock = Arc::new(ManualClock::new());
        let cache = test_cache(clock.clone()).await;
        let registry = LockRegistry::new("test");

        cache
            .set("short", json!(1), Duration::from_secs(5), Tier::Durable)
            .await;
        cache
            .set("long", json!(2), Duration::from_secs(3600), Tier::Durable)
            .await;
        drop(registry.acquire("idle").await);
        clock.advance(Duration::from_secs(10));

        let (report, pruned) = run_maintenance(&cache, &[registry.clone()]).await;

        assert_eq!(report.memory_removed, 1);
        assert_eq!(report.durable_removed, Some(1));
        assert_eq!(pruned, 1);
        assert_eq!(cache.get("long").await, Some(json!(2)));
        assert_eq!(registry.stats().tracked, 0);
    }

    #[tokio::test]
    async fn test_cleanup_task_runs_periodically() {
        let clock = Arc::new(ManualClock::new());
        let cache = test_cache(clock.clone()).await;

        cache
            .set("expire_soon", json!("value"), Duration::from_secs(1), Tier::Memory)
            .await;
        clock.advance(Duration::from_secs(2));

        let handle = spawn_cleanup_task(cache.clone(), Vec::new(), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(cache.memory().is_empty(), "Expired entry should have been swept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_can_be_aborted() {
        let clock = Arc::new(ManualClock::new());
        let cache = test_cache(clock).await;

        let handle = spawn_cleanup_task(cache, Vec::new(), Duration::from_secs(1));
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
