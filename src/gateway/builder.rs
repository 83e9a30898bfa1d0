//! Builder for configuring gateway instances

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{CacheWindows, RecipeGateway};
use crate::clock::{Clock, SystemClock};
use crate::config::{self, Config};
use crate::source::spoonacular::DEFAULT_BATCH_SIZE;
use crate::source::{
    DEFAULT_BASE_URL, RecipeSource, RetryConfig, RetryingRecipeSource, SpoonacularClient,
};
use crate::store::RecipeStore;
use crate::usage::{FileUsageStorage, MemoryUsageStorage, UsageLimits, UsageStorage, UsageTracker};
use crate::{OrdeloError, Result};

/// Where the gateway keeps its cache.
enum StoreChoice {
    /// Platform cache directory.
    Default,
    Path(PathBuf),
    InMemory,
    Existing(RecipeStore),
    Disabled,
}

/// Builder for [`RecipeGateway`].
///
/// ```rust,no_run
/// use ordelo_cache::RecipeGateway;
///
/// # async fn demo() -> ordelo_cache::Result<()> {
/// let gateway = RecipeGateway::builder()
///     .api_key("primary-key")
///     .api_key("backup-key")
///     .build()?;
///
/// let pasta = gateway.search_recipes("pasta").await?;
/// println!("{} recipes (stale: {})", pasta.data.len(), pasta.is_stale);
/// # Ok(())
/// # }
/// ```
pub struct RecipeGatewayBuilder {
    source: Option<Arc<dyn RecipeSource>>,
    api_keys: Vec<String>,
    base_url: String,
    timeout: Option<Duration>,
    batch_size: u32,
    store: StoreChoice,
    usage_storage: Option<Arc<dyn UsageStorage>>,
    usage_path: Option<PathBuf>,
    limits: UsageLimits,
    windows: CacheWindows,
    retry: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl RecipeGatewayBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            api_keys: Vec::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
            batch_size: DEFAULT_BATCH_SIZE,
            store: StoreChoice::Default,
            usage_storage: None,
            usage_path: None,
            limits: UsageLimits::default(),
            windows: CacheWindows::default(),
            retry: RetryConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Start from a loaded [`Config`].
    ///
    /// Individual setters called afterwards override the config values.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = Self::new()
            .api_keys(config.spoonacular.api_keys.iter().cloned())
            .base_url(config.spoonacular.base_url.clone())
            .timeout(config.request_timeout())
            .batch_size(config.spoonacular.batch_size)
            .limits(config.usage_limits()?)
            .windows(config.cache_windows())
            .retry(config.retry_config());

        builder.store = match (config.cache.enabled, config.db_path()) {
            (false, _) => StoreChoice::Disabled,
            (true, Some(path)) => StoreChoice::Path(path),
            (true, None) => StoreChoice::Default,
        };
        builder.usage_path = config.usage_path();
        Ok(builder)
    }

    /// Add a Spoonacular API key. Keys are tried in the order added.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_keys.push(key.into());
        self
    }

    /// Add several Spoonacular API keys, in fallback order.
    pub fn api_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Point the Spoonacular client at a different host.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Per-request HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Recipes requested per batch call (default: 12).
    pub fn batch_size(mut self, n: u32) -> Self {
        self.batch_size = n;
        self
    }

    /// Use a custom recipe source instead of the Spoonacular client.
    ///
    /// The source is still wrapped with the configured retry policy.
    pub fn source(mut self, source: Arc<dyn RecipeSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Store the cache in a SQLite file at `path`.
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = StoreChoice::Path(path.into());
        self
    }

    /// Keep the cache in memory only.
    pub fn in_memory_store(mut self) -> Self {
        self.store = StoreChoice::InMemory;
        self
    }

    /// Use an already opened store.
    pub fn store(mut self, store: RecipeStore) -> Self {
        self.store = StoreChoice::Existing(store);
        self
    }

    /// Run without a persistent cache; every operation goes remote.
    pub fn without_cache(mut self) -> Self {
        self.store = StoreChoice::Disabled;
        self
    }

    /// Persist the usage counter somewhere other than a file.
    pub fn usage_storage(mut self, storage: Arc<dyn UsageStorage>) -> Self {
        self.usage_storage = Some(storage);
        self
    }

    /// Persist the usage counter to a JSON file at `path`.
    pub fn usage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.usage_path = Some(path.into());
        self
    }

    /// Daily limit and cache-only threshold.
    pub fn limits(mut self, limits: UsageLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Freshness windows per collection.
    pub fn windows(mut self, windows: CacheWindows) -> Self {
        self.windows = windows;
        self
    }

    /// Retry policy for transient remote failures.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Time source (tests inject a [`ManualClock`](crate::clock::ManualClock)).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the gateway.
    ///
    /// Fails when no source is given and no API key is configured. A store
    /// that cannot be opened is not an error: the gateway runs uncached.
    pub fn build(self) -> Result<RecipeGateway> {
        self.limits.validate()?;
        if self.batch_size == 0 {
            return Err(OrdeloError::InvalidInput(
                "batch size must be at least 1".to_string(),
            ));
        }

        let source: Arc<dyn RecipeSource> = match self.source {
            Some(source) => source,
            None => {
                let mut client = SpoonacularClient::with_base_url(self.api_keys, &self.base_url)?
                    .batch_size(self.batch_size);
                if let Some(timeout) = self.timeout {
                    client = client.timeout(timeout)?;
                }
                debug!(keys = client.credential_count(), base_url = %self.base_url, "spoonacular client ready");
                Arc::new(client)
            }
        };
        let source: Arc<dyn RecipeSource> =
            Arc::new(RetryingRecipeSource::new(source, self.retry));

        let store = open_store(self.store, &self.clock);

        let usage_storage: Arc<dyn UsageStorage> = match (self.usage_storage, self.usage_path) {
            (Some(storage), _) => storage,
            (None, Some(path)) => Arc::new(FileUsageStorage::new(path)),
            (None, None) => match config::default_usage_path() {
                Some(path) => Arc::new(FileUsageStorage::new(path)),
                None => {
                    warn!("no data directory, usage counter will not persist");
                    Arc::new(MemoryUsageStorage::new())
                }
            },
        };

        let tracker = UsageTracker::new(usage_storage, self.clock.clone(), self.limits);
        let state = tracker.init();
        info!(
            date = %state.date,
            count = state.count,
            daily_limit = self.limits.daily_limit,
            cache_only = state.cache_only_mode,
            cached = store.is_some(),
            "recipe gateway ready"
        );

        Ok(RecipeGateway::from_parts(
            store,
            source,
            tracker,
            self.clock,
            self.windows,
            self.batch_size,
        ))
    }
}

impl Default for RecipeGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn open_store(choice: StoreChoice, clock: &Arc<dyn Clock>) -> Option<RecipeStore> {
    let opened = match choice {
        StoreChoice::Disabled => return None,
        StoreChoice::Existing(store) => return Some(store),
        StoreChoice::InMemory => RecipeStore::open_in_memory(clock.clone()),
        StoreChoice::Path(path) => RecipeStore::open(&path, clock.clone()),
        StoreChoice::Default => match config::default_db_path() {
            Some(path) => RecipeStore::open(&path, clock.clone()),
            None => Err(OrdeloError::StorageUnavailable(
                "no cache directory on this platform".to_string(),
            )),
        },
    };

    match opened {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "persistent store unavailable, caching disabled");
            None
        }
    }
}
