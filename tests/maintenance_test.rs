//! Cache maintenance against a real SQLite file.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as Age;
use serde_json::json;
use tempfile::TempDir;

use ordelo_cache::{CacheMaintenance, CacheWindows, Collection, ManualClock, RecipeStore};

fn store_in(dir: &TempDir, clock: &ManualClock) -> RecipeStore {
    RecipeStore::open(&dir.path().join("recipes.db"), Arc::new(clock.clone())).unwrap()
}

async fn seed(store: &RecipeStore, clock: &ManualClock) {
    store.put(Collection::Recipes, "1", &json!({ "id": 1, "title": "old" })).await.unwrap();
    store.put(Collection::Searches, "pasta", &json!([])).await.unwrap();
    store.put(Collection::Cuisines, "thai", &json!([])).await.unwrap();
    clock.advance(Age::days(3));
    store.put(Collection::Recipes, "2", &json!({ "id": 2, "title": "new" })).await.unwrap();
    store.put(Collection::Searches, "soup", &json!([])).await.unwrap();
}

#[tokio::test]
async fn cleanup_removes_only_expired_records() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let store = store_in(&dir, &clock);
    seed(&store, &clock).await;

    let maintenance = CacheMaintenance::new(store.clone(), CacheWindows::default());
    let reports = maintenance.cleanup().await;
    assert_eq!(reports.len(), 3);

    let by = |c: Collection| reports.iter().find(|r| r.collection == c).unwrap().clone();
    // Three days is inside the 60 day horizon for recipes.
    assert_eq!(by(Collection::Recipes).deleted, 0);
    // But past the 48 hour horizon for searches and cuisines.
    assert_eq!(by(Collection::Searches).deleted, 1);
    assert_eq!(by(Collection::Cuisines).deleted, 1);

    assert!(store.get(Collection::Searches, "pasta").await.unwrap().is_none());
    assert!(store.get(Collection::Searches, "soup").await.unwrap().is_some());
    assert_eq!(store.count(Collection::Recipes).await.unwrap(), 2);
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let store = store_in(&dir, &clock);
    seed(&store, &clock).await;

    let maintenance = CacheMaintenance::new(store.clone(), CacheWindows::default());
    let first = maintenance.cleanup().await;
    let second = maintenance.cleanup().await;

    assert!(first.iter().any(|r| r.deleted > 0));
    assert!(second.iter().all(|r| r.deleted == 0));
    for report in &second {
        let earlier = first.iter().find(|r| r.collection == report.collection).unwrap();
        assert_eq!(report.remaining, earlier.remaining);
    }
}

#[tokio::test]
async fn custom_windows_shorten_retention() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let store = store_in(&dir, &clock);
    seed(&store, &clock).await;

    let windows = CacheWindows {
        recipe: Age::hours(12),
        ..CacheWindows::default()
    };
    let reports = CacheMaintenance::new(store.clone(), windows).cleanup().await;
    let recipes = reports
        .iter()
        .find(|r| r.collection == Collection::Recipes)
        .unwrap();
    assert_eq!((recipes.before, recipes.deleted, recipes.remaining), (2, 1, 1));
}

#[tokio::test]
async fn spawned_loop_sweeps_immediately() {
    let dir = TempDir::new().unwrap();
    let clock = ManualClock::starting_now();
    let store = store_in(&dir, &clock);
    seed(&store, &clock).await;

    let handle = CacheMaintenance::new(store.clone(), CacheWindows::default())
        .spawn(Duration::from_secs(3600));
    assert!(handle.is_running());

    let mut swept = false;
    for _ in 0..200 {
        if store.count(Collection::Searches).await.unwrap() == 1 {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(swept, "first sweep should run without waiting for the interval");

    handle.shutdown().await;
}

#[tokio::test]
async fn loop_repeats_on_interval_and_stops_on_drop() {
    let clock = ManualClock::starting_now();
    let store = RecipeStore::open_in_memory(Arc::new(clock.clone())).unwrap();
    let handle = CacheMaintenance::new(store.clone(), CacheWindows::default())
        .spawn(Duration::from_millis(100));

    // Let the immediate sweep run, then add a record that expires later.
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.put(Collection::Cuisines, "thai", &json!([])).await.unwrap();
    clock.advance(Age::days(3));

    let mut remaining = 1;
    for _ in 0..200 {
        remaining = store.count(Collection::Cuisines).await.unwrap();
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(remaining, 0, "a later sweep should remove the expired record");

    drop(handle);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // No sweep after the handle is gone.
    store.put(Collection::Cuisines, "lao", &json!([])).await.unwrap();
    clock.advance(Age::days(3));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.count(Collection::Cuisines).await.unwrap(), 1);
}
