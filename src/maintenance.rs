//! Age-based cache cleanup.
//!
//! Records are deleted once they are older than twice their collection's
//! freshness window, so a stale record stays available as a fallback for a
//! full window before it goes. There is no size-based eviction.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::CacheWindows;
use crate::store::{Collection, RecipeStore};
use crate::telemetry;

/// Default interval between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of sweeping one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub collection: Collection,
    pub before: usize,
    pub deleted: usize,
    pub remaining: usize,
}

/// Sweeps expired records out of a [`RecipeStore`].
#[derive(Clone)]
pub struct CacheMaintenance {
    store: RecipeStore,
    windows: CacheWindows,
}

impl CacheMaintenance {
    pub fn new(store: RecipeStore, windows: CacheWindows) -> Self {
        Self { store, windows }
    }

    /// Delete records older than twice their window in every collection.
    ///
    /// A collection that fails is logged and skipped; the others are still
    /// swept. Returns a report for each collection that succeeded.
    pub async fn cleanup(&self) -> Vec<CleanupReport> {
        let mut reports = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            match self.sweep(collection).await {
                Ok(report) => {
                    if report.deleted > 0 {
                        info!(
                            %collection,
                            before = report.before,
                            deleted = report.deleted,
                            remaining = report.remaining,
                            "expired cache entries removed"
                        );
                    } else {
                        debug!(%collection, entries = report.remaining, "nothing to clean");
                    }
                    reports.push(report);
                }
                Err(e) => warn!(%collection, error = %e, "cache cleanup failed"),
            }
        }
        reports
    }

    async fn sweep(&self, collection: Collection) -> crate::Result<CleanupReport> {
        let window = self.windows.for_collection(collection);
        let max_age = window.checked_mul(2).unwrap_or(chrono::Duration::MAX);
        let before = self.store.count(collection).await?;
        let deleted = self.store.delete_older_than(collection, max_age).await?;
        let remaining = self.store.count(collection).await?;

        metrics::counter!(telemetry::CLEANUP_DELETED_TOTAL, "collection" => collection.name())
            .increment(deleted as u64);

        Ok(CleanupReport {
            collection,
            before,
            deleted,
            remaining,
        })
    }

    /// Run [`cleanup`](Self::cleanup) now and then every `interval`.
    ///
    /// The loop runs on a detached task until the returned handle is
    /// dropped or shut down.
    pub fn spawn(self, interval: Duration) -> MaintenanceHandle {
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                // First tick completes immediately.
                timer.tick().await;
                self.cleanup().await;
            }
        });
        debug!(interval_secs = interval.as_secs(), "cache maintenance scheduled");
        MaintenanceHandle { task }
    }
}

/// Owns the maintenance loop; dropping it stops the loop.
pub struct MaintenanceHandle {
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop the loop and wait for it to wind down.
    pub async fn shutdown(mut self) {
        self.task.abort();
        // Resolves with a cancellation error once the task is gone.
        let _ = (&mut self.task).await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn sweep_uses_twice_the_window() {
        let clock = ManualClock::starting_now();
        let store = RecipeStore::open_in_memory(Arc::new(clock.clone())).unwrap();
        store.put(Collection::Searches, "old", &json!([])).await.unwrap();
        clock.advance(chrono::Duration::hours(47));
        store.put(Collection::Searches, "new", &json!([])).await.unwrap();

        let maintenance = CacheMaintenance::new(store.clone(), CacheWindows::default());
        // 47h old: past the 24h window but inside 48h.
        let reports = maintenance.cleanup().await;
        assert!(reports.iter().all(|r| r.deleted == 0));

        clock.advance(chrono::Duration::hours(2));
        let reports = maintenance.cleanup().await;
        let searches = reports
            .iter()
            .find(|r| r.collection == Collection::Searches)
            .unwrap();
        assert_eq!((searches.before, searches.deleted, searches.remaining), (2, 1, 1));
    }

    #[tokio::test]
    async fn huge_windows_keep_every_record() {
        let clock = ManualClock::starting_now();
        let store = RecipeStore::open_in_memory(Arc::new(clock.clone())).unwrap();
        store.put(Collection::Recipes, "1", &json!({ "id": 1 })).await.unwrap();
        clock.advance(chrono::Duration::days(365));

        let windows = CacheWindows {
            recipe: chrono::Duration::MAX,
            search: chrono::Duration::MAX,
            cuisine: chrono::Duration::MAX,
        };
        let reports = CacheMaintenance::new(store.clone(), windows).cleanup().await;
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.deleted == 0));
        assert_eq!(store.count(Collection::Recipes).await.unwrap(), 1);
    }
}
