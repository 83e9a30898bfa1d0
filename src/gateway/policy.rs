//! Freshness windows and cache key normalization.

use chrono::Duration;

use crate::store::Collection;
use crate::types::RecipeId;

/// Key under which the last random batch is stored in `recipes`.
pub const RANDOM_KEY: &str = "random";

/// Maximum age before a record is considered stale.
///
/// Maintenance deletes records older than twice their window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheWindows {
    /// Single recipes and the random batch.
    pub recipe: Duration,
    pub search: Duration,
    pub cuisine: Duration,
}

impl Default for CacheWindows {
    fn default() -> Self {
        Self {
            recipe: Duration::days(30),
            search: Duration::hours(24),
            cuisine: Duration::hours(24),
        }
    }
}

impl CacheWindows {
    /// Window for a store collection.
    pub fn for_collection(&self, collection: Collection) -> Duration {
        match collection {
            Collection::Recipes => self.recipe,
            Collection::Searches => self.search,
            Collection::Cuisines => self.cuisine,
        }
    }
}

/// What a caller wants to check with
/// [`RecipeGateway::is_cache_available`](super::RecipeGateway::is_cache_available).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Recipe,
    Random,
    Search,
    Cuisine,
}

impl CacheKind {
    pub fn collection(&self) -> Collection {
        match self {
            CacheKind::Recipe | CacheKind::Random => Collection::Recipes,
            CacheKind::Search => Collection::Searches,
            CacheKind::Cuisine => Collection::Cuisines,
        }
    }

    /// Store key for a caller-supplied identifier.
    pub fn normalize(&self, key: &str) -> String {
        match self {
            CacheKind::Recipe => key.trim().to_owned(),
            CacheKind::Random => RANDOM_KEY.to_owned(),
            CacheKind::Search => normalize_query(key),
            CacheKind::Cuisine => normalize_cuisine(key),
        }
    }
}

/// Search key: trimmed and lower-cased.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Cuisine key: trimmed and lower-cased.
///
/// Surrounding whitespace is dropped on purpose, the same as for search
/// queries, so `" Thai"` and `"thai"` share one entry and one remote call.
/// The trimmed value is also what is sent upstream.
pub fn normalize_cuisine(cuisine: &str) -> String {
    cuisine.trim().to_lowercase()
}

pub fn recipe_key(id: RecipeId) -> String {
    id.to_string()
}
