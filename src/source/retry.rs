//! Retry configuration, delay calculation, and the retrying source decorator.
//!
//! Provides [`RetryConfig`] for controlling retry behaviour and
//! [`RetryingRecipeSource`], which wraps a [`RecipeSource`] with automatic
//! retry on transient errors. The decorator delegates to the shared
//! [`with_retry()`] helper, keeping retry logic in a single place.

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::traits::RecipeSource;
use crate::telemetry;
use crate::types::{Recipe, RecipeId};
use crate::{OrdeloError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff: the wait before retry `n` (0-indexed) is
/// `initial_delay * 2^n`, capped at `max_delay`. With [`jitter`](Self::jitter)
/// enabled the actual sleep is drawn from the upper half of that delay, so
/// clients that failed together do not retry in lockstep.
///
/// ```rust
/// # use ordelo_cache::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    pub max_delay: Duration,
    /// Whether to randomise delays. Default: false.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new config with the default policy (3 attempts, 1s base).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    /// Does not include jitter; see [`effective_delay()`](Self::effective_delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// The delay actually slept before retry `attempt`.
    ///
    /// Without jitter this is [`delay_for_attempt()`](Self::delay_for_attempt).
    /// With jitter it lies in `[delay / 2, delay]`.
    pub fn effective_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }
        let floor = delay / 2;
        let spread = u64::try_from((delay - floor).as_nanos()).unwrap_or(u64::MAX);
        if spread == 0 {
            return delay;
        }
        floor + Duration::from_nanos(random_u64(attempt) % spread.saturating_add(1))
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by [`OrdeloError::is_transient()`])
/// up to `config.max_attempts`, using exponential backoff. Every attempt, including
/// the first, counts toward the limit; there is no wait after the last one.
///
/// Permanent errors are returned immediately without retry.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                        .increment(1);
                    let delay = config.effective_delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e), // permanent error, no retry
        }
    }
    Err(last_err.unwrap_or_else(|| OrdeloError::Http(format!("{operation}: no attempts made"))))
}

// Each `RandomState` is seeded differently, which is all the spread needs.
fn random_u64(attempt: u32) -> u64 {
    RandomState::new().hash_one(attempt)
}

// ============================================================================
// RetryingRecipeSource
// ============================================================================

/// Decorator that wraps a [`RecipeSource`] with retry logic.
///
/// On transient errors, retries with exponential backoff up to
/// `config.max_attempts`. Permanent errors (credentials exhausted, not
/// found, bad payloads) are returned immediately.
pub struct RetryingRecipeSource {
    inner: Arc<dyn RecipeSource>,
    config: RetryConfig,
}

impl RetryingRecipeSource {
    /// Wrap a recipe source with retry logic.
    pub fn new(inner: Arc<dyn RecipeSource>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl RecipeSource for RetryingRecipeSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch_random(&self, count: u32) -> Result<Vec<Recipe>> {
        with_retry(&self.config, "random", || self.inner.fetch_random(count)).await
    }

    async fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        with_retry(&self.config, "search", || self.inner.search(query)).await
    }

    async fn by_cuisine(&self, cuisine: &str) -> Result<Vec<Recipe>> {
        with_retry(&self.config, "cuisine", || self.inner.by_cuisine(cuisine)).await
    }

    async fn by_id(&self, id: RecipeId) -> Result<Recipe> {
        with_retry(&self.config, "by_id", || self.inner.by_id(id)).await
    }
}
