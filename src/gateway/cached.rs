//! RecipeGateway - cache-aware access to the recipe source

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use super::RecipeGatewayBuilder;
use super::policy::{self, CacheKind, CacheWindows, RANDOM_KEY};
use crate::clock::Clock;
use crate::dedup::{DeduplicationRegistry, RequestKey};
use crate::maintenance::{CacheMaintenance, MaintenanceHandle};
use crate::source::RecipeSource;
use crate::store::{Collection, RecipeStore};
use crate::telemetry;
use crate::types::{Fetched, Recipe, RecipeId, UsageStatus};
use crate::usage::UsageTracker;
use crate::{OrdeloError, Result};

/// A decoded store record with its age at read time.
struct CachedEntry<T> {
    data: T,
    written_at: DateTime<Utc>,
    age: Duration,
}

/// Cache-aware front for the recipe source.
///
/// Each operation reads the store first and decides, per record age and
/// the daily quota, whether to:
///
/// - return a fresh record without touching the network,
/// - return a stale record and refresh it on a detached task,
/// - return a stale record as-is because the quota forbids a call,
/// - make a tracked remote call and write the result back, or
/// - fail with [`OrdeloError::QuotaExceeded`] when nothing is cached and
///   no call is allowed.
///
/// Identical concurrent remote calls are collapsed into one, so a burst of
/// callers costs a single unit of quota.
///
/// Cheap to clone; clones share the store, tracker and in-flight map.
#[derive(Clone)]
pub struct RecipeGateway {
    inner: Arc<Inner>,
}

struct Inner {
    store: Option<RecipeStore>,
    source: Arc<dyn RecipeSource>,
    tracker: UsageTracker,
    clock: Arc<dyn Clock>,
    windows: CacheWindows,
    batch_size: u32,
    batches: DeduplicationRegistry<Vec<Recipe>>,
    recipes: DeduplicationRegistry<Recipe>,
}

impl RecipeGateway {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> RecipeGatewayBuilder {
        RecipeGatewayBuilder::new()
    }

    pub(crate) fn from_parts(
        store: Option<RecipeStore>,
        source: Arc<dyn RecipeSource>,
        tracker: UsageTracker,
        clock: Arc<dyn Clock>,
        windows: CacheWindows,
        batch_size: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                tracker,
                clock,
                windows,
                batch_size,
                batches: DeduplicationRegistry::new(),
                recipes: DeduplicationRegistry::new(),
            }),
        }
    }

    /// The persistent store, if caching is enabled.
    pub fn store(&self) -> Option<&RecipeStore> {
        self.inner.store.as_ref()
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.inner.tracker
    }

    pub fn windows(&self) -> CacheWindows {
        self.inner.windows
    }

    /// Maintenance sweeper over this gateway's store.
    pub fn maintenance(&self) -> Option<CacheMaintenance> {
        self.inner
            .store
            .clone()
            .map(|store| CacheMaintenance::new(store, self.inner.windows))
    }

    /// Run cleanup now and then every `interval` on a detached task.
    ///
    /// Returns `None` when caching is disabled. Must be called from within
    /// a tokio runtime.
    pub fn start_maintenance(&self, interval: std::time::Duration) -> Option<MaintenanceHandle> {
        self.maintenance().map(|m| m.spawn(interval))
    }

    /// Today's quota snapshot.
    pub fn api_usage_info(&self) -> UsageStatus {
        self.inner.tracker.status()
    }

    /// Whether any record, fresh or stale, exists for `key`.
    pub async fn is_cache_available(&self, kind: CacheKind, key: &str) -> bool {
        let Some(store) = &self.inner.store else {
            return false;
        };
        let key = kind.normalize(key);
        if key.is_empty() {
            return false;
        }
        matches!(store.get(kind.collection(), &key).await, Ok(Some(_)))
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Latest batch of random recipes.
    ///
    /// A batch written today is served without a call. Otherwise a new batch
    /// is fetched; if that fails, or the quota forbids it, the previous batch
    /// is returned marked stale.
    #[instrument(skip(self), fields(operation = "random"))]
    pub async fn fetch_random_recipes(&self) -> Result<Fetched<Vec<Recipe>>> {
        const OP: &str = "random";

        let previous = match self
            .read::<Vec<Recipe>>(Collection::Recipes, RANDOM_KEY)
            .await
        {
            Some(entry)
                if self.written_today(entry.written_at) && entry.age <= self.inner.windows.recipe =>
            {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => OP).increment(1);
                debug!(count = entry.data.len(), "serving today's random batch");
                return Ok(Fetched::cached(entry.data));
            }
            other => other.map(|entry| entry.data),
        };

        if !self.inner.tracker.can_make_call() {
            return match previous {
                Some(recipes) => {
                    metrics::counter!(telemetry::STALE_SERVED_TOTAL, "operation" => OP)
                        .increment(1);
                    info!("API limit reached, serving last random batch");
                    Ok(Fetched::stale(recipes))
                }
                None => Err(self.blocked(OP, Collection::Recipes, RANDOM_KEY)),
            };
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => OP).increment(1);
        match self.remote_random().await {
            Ok(recipes) => Ok(Fetched::remote(recipes)),
            Err(e) => match previous {
                Some(recipes) => {
                    warn!(error = %e, "random fetch failed, serving previous batch");
                    metrics::counter!(telemetry::STALE_SERVED_TOTAL, "operation" => OP)
                        .increment(1);
                    Ok(Fetched::stale(recipes))
                }
                None => Err(e),
            },
        }
    }

    /// Recipes matching a free-text query.
    ///
    /// The query is trimmed and lower-cased before use; an empty query
    /// returns no recipes without touching the store or the network.
    #[instrument(skip(self), fields(operation = "search"))]
    pub async fn search_recipes(&self, query: &str) -> Result<Fetched<Vec<Recipe>>> {
        let key = policy::normalize_query(query);
        if key.is_empty() {
            return Ok(Fetched::cached(Vec::new()));
        }

        let this = self.clone();
        let remote_key = key.clone();
        self.cached_or_fetch(
            "search",
            Collection::Searches,
            &key,
            self.inner.windows.search,
            |_| true,
            move || async move { this.remote_search(remote_key).await },
        )
        .await
    }

    /// Recipes for a cuisine (e.g. `"italian"`).
    ///
    /// Results lacking ingredients or instructions are completed through
    /// [`fetch_recipe_by_id`](Self::fetch_recipe_by_id) before being cached.
    #[instrument(skip(self), fields(operation = "cuisine"))]
    pub async fn filter_recipes_by_cuisine(&self, cuisine: &str) -> Result<Fetched<Vec<Recipe>>> {
        let key = policy::normalize_cuisine(cuisine);
        if key.is_empty() {
            return Ok(Fetched::cached(Vec::new()));
        }

        let this = self.clone();
        let remote_key = key.clone();
        self.cached_or_fetch(
            "cuisine",
            Collection::Cuisines,
            &key,
            self.inner.windows.cuisine,
            |_| true,
            move || async move { this.remote_cuisine(remote_key).await },
        )
        .await
    }

    /// A single recipe with full details.
    ///
    /// A cached summary without ingredients or instructions counts as a miss
    /// while calls are allowed, and as stale otherwise.
    #[instrument(skip(self), fields(operation = "by_id"))]
    pub async fn fetch_recipe_by_id(&self, id: RecipeId) -> Result<Fetched<Recipe>> {
        let this = self.clone();
        self.cached_or_fetch(
            "by_id",
            Collection::Recipes,
            &policy::recipe_key(id),
            self.inner.windows.recipe,
            Recipe::is_complete,
            move || async move { this.remote_by_id(id).await },
        )
        .await
    }

    // ========================================================================
    // Cache decision
    // ========================================================================

    async fn cached_or_fetch<T, F, Fut>(
        &self,
        operation: &'static str,
        collection: Collection,
        key: &str,
        window: Duration,
        usable: fn(&T) -> bool,
        fetch: F,
    ) -> Result<Fetched<T>>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let cached = match self.read::<T>(collection, key).await {
            Some(entry) if !usable(&entry.data) && self.inner.tracker.can_make_call() => {
                debug!(%collection, key, "cached entry is incomplete, refetching");
                None
            }
            other => other,
        };

        match cached {
            Some(entry) if usable(&entry.data) && entry.age <= window => {
                metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => operation)
                    .increment(1);
                debug!(%collection, key, "cache hit");
                Ok(Fetched::cached(entry.data))
            }
            Some(entry) => {
                metrics::counter!(telemetry::STALE_SERVED_TOTAL, "operation" => operation)
                    .increment(1);
                if self.inner.tracker.can_make_call() {
                    debug!(
                        %collection,
                        key,
                        age_hours = entry.age.num_hours(),
                        "serving stale entry, refreshing in background"
                    );
                    let refresh = fetch();
                    let key = key.to_owned();
                    tokio::spawn(async move {
                        match refresh.await {
                            Ok(_) => debug!(%collection, key = %key, "background refresh complete"),
                            Err(e) => warn!(
                                %collection,
                                key = %key,
                                error = %e,
                                "background refresh failed, keeping stale entry"
                            ),
                        }
                    });
                } else {
                    info!(%collection, key, "API limit reached, serving stale entry");
                }
                Ok(Fetched::stale(entry.data))
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation)
                    .increment(1);
                if !self.inner.tracker.can_make_call() {
                    return Err(self.blocked(operation, collection, key));
                }
                fetch().await.map(Fetched::remote)
            }
        }
    }

    fn blocked(&self, operation: &'static str, collection: Collection, key: &str) -> OrdeloError {
        metrics::counter!(telemetry::QUOTA_BLOCKED_TOTAL, "operation" => operation).increment(1);
        warn!(operation, %collection, key, "API limit reached and nothing cached");
        OrdeloError::QuotaExceeded {
            key: format!("{collection}/{key}"),
        }
    }

    fn written_today(&self, written_at: DateTime<Utc>) -> bool {
        written_at.with_timezone(&Local).format("%Y-%m-%d").to_string() == self.inner.clock.today()
    }

    // ========================================================================
    // Remote calls (deduplicated, counted, written back)
    // ========================================================================

    async fn remote_random(&self) -> Result<Vec<Recipe>> {
        let count = self.inner.batch_size;
        let key = RequestKey::get("/recipes/random", [("number", count.to_string())]);
        let this = self.clone();
        self.inner
            .batches
            .dedupe(key, move || async move {
                let recipes = this
                    .tracked("random", this.inner.source.fetch_random(count))
                    .await?;
                if recipes.is_empty() {
                    return Err(OrdeloError::EmptyResponse);
                }
                this.write_batch(Collection::Recipes, RANDOM_KEY, &recipes)
                    .await;
                Ok(recipes)
            })
            .await
    }

    async fn remote_search(&self, query: String) -> Result<Vec<Recipe>> {
        let key = RequestKey::get(
            "/recipes/complexSearch",
            [
                ("query", query.clone()),
                ("number", self.inner.batch_size.to_string()),
            ],
        );
        let this = self.clone();
        self.inner
            .batches
            .dedupe(key, move || async move {
                let recipes = this
                    .tracked("search", this.inner.source.search(&query))
                    .await?;
                this.write_batch(Collection::Searches, &query, &recipes)
                    .await;
                Ok(recipes)
            })
            .await
    }

    async fn remote_cuisine(&self, cuisine: String) -> Result<Vec<Recipe>> {
        let key = RequestKey::get(
            "/recipes/complexSearch",
            [
                ("cuisine", cuisine.clone()),
                ("number", self.inner.batch_size.to_string()),
                ("instructionsRequired", "true".to_owned()),
            ],
        );
        let this = self.clone();
        self.inner
            .batches
            .dedupe(key, move || async move {
                let recipes = this
                    .tracked("cuisine", this.inner.source.by_cuisine(&cuisine))
                    .await?;
                let recipes = this.complete_recipes(recipes).await;
                this.write_batch(Collection::Cuisines, &cuisine, &recipes)
                    .await;
                Ok(recipes)
            })
            .await
    }

    async fn remote_by_id(&self, id: RecipeId) -> Result<Recipe> {
        let key = RequestKey::get(
            format!("/recipes/{id}/information"),
            [("includeNutrition", "true")],
        );
        let this = self.clone();
        self.inner
            .recipes
            .dedupe(key, move || async move {
                let recipe = this.tracked("by_id", this.inner.source.by_id(id)).await?;
                this.write(Collection::Recipes, &policy::recipe_key(id), &recipe)
                    .await;
                Ok(recipe)
            })
            .await
    }

    /// Await a remote call and count it against today's quota on success.
    async fn tracked<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = call.await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            telemetry::REMOTE_CALLS_TOTAL,
            "operation" => operation,
            "status" => status
        )
        .increment(1);

        match &result {
            Ok(_) => {
                let state = self.inner.tracker.increment(1);
                debug!(
                    operation,
                    source = self.inner.source.name(),
                    count = state.count,
                    "remote call succeeded"
                );
            }
            Err(e) if e.is_remote_failure() => {
                warn!(operation, source = self.inner.source.name(), error = %e, "remote call failed")
            }
            Err(e) => error!(
                operation,
                source = self.inner.source.name(),
                error = %e,
                "remote response could not be used"
            ),
        }
        result
    }

    /// Fill in recipes that lack ingredients or instructions.
    ///
    /// A recipe that cannot be completed is left out.
    async fn complete_recipes(&self, recipes: Vec<Recipe>) -> Vec<Recipe> {
        let completed = join_all(recipes.into_iter().map(|recipe| async move {
            if recipe.is_complete() {
                return Some(recipe);
            }
            match self.fetch_recipe_by_id(recipe.id).await {
                Ok(full) if full.data.is_complete() => Some(full.into_inner()),
                Ok(_) => {
                    debug!(id = recipe.id, "recipe details still missing, dropping");
                    None
                }
                Err(e) => {
                    debug!(id = recipe.id, error = %e, "could not complete recipe details, dropping");
                    None
                }
            }
        }))
        .await;
        completed.into_iter().flatten().collect()
    }

    // ========================================================================
    // Store access (failures degrade to misses / skipped writes)
    // ========================================================================

    async fn read<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Option<CachedEntry<T>> {
        let store = self.inner.store.as_ref()?;
        let record = match store.get(collection, key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(%collection, key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match record.decode::<T>() {
            Ok(data) => Some(CachedEntry {
                age: record.age(self.inner.clock.now()),
                written_at: record.written_at,
                data,
            }),
            Err(e) => {
                warn!(%collection, key, error = %e, "cached payload has unexpected shape, dropping");
                if let Err(e) = store.delete(collection, key).await {
                    warn!(%collection, key, error = %e, "failed to drop malformed entry");
                }
                None
            }
        }
    }

    async fn write<T: Serialize + Sync + ?Sized>(&self, collection: Collection, key: &str, payload: &T) {
        let Some(store) = &self.inner.store else {
            return;
        };
        if let Err(e) = store.put(collection, key, payload).await {
            warn!(%collection, key, error = %e, "cache write failed");
        }
    }

    /// Store a list under `key`, and each complete recipe under its own id.
    ///
    /// Summaries are not stored per id, so a later by-id lookup fetches the
    /// full detail.
    async fn write_batch(&self, collection: Collection, key: &str, recipes: &[Recipe]) {
        self.write(collection, key, recipes).await;
        for recipe in recipes.iter().filter(|r| r.is_complete()) {
            self.write(Collection::Recipes, &policy::recipe_key(recipe.id), recipe)
                .await;
        }
    }
}
