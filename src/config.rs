//! Configuration loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. An explicit path passed to [`Config::load`]
//! 2. `$ORDELO_CONFIG`
//! 3. `<config dir>/ordelo/config.toml` (e.g. `~/.config/ordelo/config.toml`)
//! 4. Built-in defaults
//!
//! API keys are read from `[spoonacular] api_keys` and, when that list is
//! empty, from `SPOONACULAR_API_KEYS` (comma separated, tried in order).
//!
//! ```toml
//! [cache]
//! recipe_window_hours = 720
//! search_window_hours = 24
//!
//! [usage]
//! daily_limit = 500
//! cache_only_threshold = 450
//!
//! [spoonacular]
//! api_keys = ["primary-key", "backup-key"]
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gateway::CacheWindows;
use crate::source::RetryConfig;
use crate::source::spoonacular::{DEFAULT_BASE_URL, DEFAULT_BATCH_SIZE};
use crate::store::DEFAULT_DB_FILE;
use crate::usage::{
    DEFAULT_CACHE_ONLY_THRESHOLD, DEFAULT_DAILY_LIMIT, DEFAULT_USAGE_FILE, UsageLimits,
};
use crate::{OrdeloError, Result};

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "ORDELO_CONFIG";

/// Environment variable holding comma-separated Spoonacular keys.
pub const API_KEYS_ENV_VAR: &str = "SPOONACULAR_API_KEYS";

const APP_DIR: &str = "ordelo";

/// Upper bound for any window or interval, in hours (100 years).
pub const MAX_HOURS: u64 = 100 * 365 * 24;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub usage: UsageConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub spoonacular: SpoonacularConfig,
}

/// Persistent store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Set to `false` to run without a persistent store.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Database file (default: `<cache dir>/ordelo/ordelo-recipe-cache.sqlite3`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Window for single recipes and the random batch (default: 720 = 30 days).
    #[serde(default = "default_recipe_window")]
    pub recipe_window_hours: u64,
    #[serde(default = "default_list_window")]
    pub search_window_hours: u64,
    #[serde(default = "default_list_window")]
    pub cuisine_window_hours: u64,
    /// Hours between maintenance sweeps (default: 24).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            recipe_window_hours: default_recipe_window(),
            search_window_hours: default_list_window(),
            cuisine_window_hours: default_list_window(),
            cleanup_interval_hours: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_recipe_window() -> u64 {
    30 * 24
}

fn default_list_window() -> u64 {
    24
}

fn default_cleanup_interval() -> u64 {
    24
}

/// Daily quota settings.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageConfig {
    /// Usage counter file (default: `<data dir>/ordelo/spoonacular_api_usage.json`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_cache_only_threshold")]
    pub cache_only_threshold: u32,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            path: None,
            daily_limit: default_daily_limit(),
            cache_only_threshold: default_cache_only_threshold(),
        }
    }
}

fn default_daily_limit() -> u32 {
    DEFAULT_DAILY_LIMIT
}

fn default_cache_only_threshold() -> u32 {
    DEFAULT_CACHE_ONLY_THRESHOLD
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomise each backoff within its upper half.
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

/// Spoonacular client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SpoonacularConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Recipes per batch request (default: 12).
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Keys tried in order; later keys are fallbacks.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

impl Default for SpoonacularConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout(),
            api_keys: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// A missing explicit path is an error; missing default locations fall
    /// back to built-in defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            OrdeloError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            OrdeloError::Configuration(msg) => {
                OrdeloError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| OrdeloError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        self.usage_limits()?;
        if self.spoonacular.batch_size == 0 {
            return Err(OrdeloError::Configuration(
                "spoonacular.batch_size must be at least 1".to_string(),
            ));
        }
        if self.cache.cleanup_interval_hours == 0 {
            return Err(OrdeloError::Configuration(
                "cache.cleanup_interval_hours must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("recipe_window_hours", self.cache.recipe_window_hours),
            ("search_window_hours", self.cache.search_window_hours),
            ("cuisine_window_hours", self.cache.cuisine_window_hours),
            ("cleanup_interval_hours", self.cache.cleanup_interval_hours),
        ] {
            if value > MAX_HOURS {
                return Err(OrdeloError::Configuration(format!(
                    "cache.{name} = {value} exceeds the maximum of {MAX_HOURS} hours"
                )));
            }
        }
        Ok(())
    }

    /// Fill API keys from `SPOONACULAR_API_KEYS` when the file lists none.
    pub fn apply_env(&mut self) {
        if !self.spoonacular.api_keys.is_empty() {
            return;
        }
        if let Ok(raw) = std::env::var(API_KEYS_ENV_VAR) {
            self.spoonacular.api_keys = parse_key_list(&raw);
        }
    }

    pub fn usage_limits(&self) -> Result<UsageLimits> {
        UsageLimits::new(self.usage.daily_limit, self.usage.cache_only_threshold)
            .map_err(|e| OrdeloError::Configuration(e.to_string()))
    }

    pub fn cache_windows(&self) -> CacheWindows {
        CacheWindows {
            recipe: hours(self.cache.recipe_window_hours),
            search: hours(self.cache.search_window_hours),
            cuisine: hours(self.cache.cuisine_window_hours),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry.max_attempts)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .jitter(self.retry.jitter)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cache.cleanup_interval_hours.min(MAX_HOURS) * 3600)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.spoonacular.timeout_secs)
    }

    /// Configured database path or the platform default.
    pub fn db_path(&self) -> Option<PathBuf> {
        self.cache.path.clone().or_else(default_db_path)
    }

    /// Configured usage file path or the platform default.
    pub fn usage_path(&self) -> Option<PathBuf> {
        self.usage.path.clone().or_else(default_usage_path)
    }

    /// Resolve the config file path. `None` means use defaults.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(OrdeloError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(OrdeloError::Configuration(format!(
                "Config file from ${CONFIG_ENV_VAR} not found: {path:?}"
            )));
        }

        if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join(APP_DIR).join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        Ok(None)
    }
}

/// `<cache dir>/ordelo/ordelo-recipe-cache.sqlite3`
pub fn default_db_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join(APP_DIR).join(DEFAULT_DB_FILE))
}

/// `<data dir>/ordelo/spoonacular_api_usage.json`
pub fn default_usage_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR).join(DEFAULT_USAGE_FILE))
}

/// Split a comma-separated key list, dropping blanks.
pub fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
        .collect()
}

fn hours(h: u64) -> chrono::Duration {
    // MAX_HOURS fits in i64 and in chrono's range.
    chrono::Duration::hours(h.min(MAX_HOURS) as i64)
}
