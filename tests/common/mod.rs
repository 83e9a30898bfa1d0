//! Shared fixtures for gateway integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::json;

use ordelo_cache::{
    CacheWindows, Clock, Ingredient, ManualClock, MemoryUsageStorage, OrdeloError, Recipe,
    RecipeGateway, RecipeId, RecipeSource, Result, RetryConfig, UsageLimits,
};

// ============================================================================
// Mock source
// ============================================================================

/// Recipe source that records every call and tags results with a call
/// sequence number (`"pasta v2"`), so a refresh is visible in the data.
#[derive(Default)]
pub struct MockSource {
    calls: Mutex<Vec<String>>,
    seq: AtomicUsize,
    failure: Mutex<Option<OrdeloError>>,
    detail_failure: Mutex<Option<OrdeloError>>,
    delay: Mutex<Duration>,
}

impl MockSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every following call fails with `err`.
    pub fn fail_with(&self, err: OrdeloError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Only `by_id` calls fail with `err`; list endpoints keep working.
    pub fn fail_details_with(&self, err: OrdeloError) {
        *self.detail_failure.lock().unwrap() = Some(err);
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
        *self.detail_failure.lock().unwrap() = None;
    }

    /// Hold each call open for `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn record(&self, call: String) -> Result<usize> {
        self.record_with(call, None).await
    }

    async fn record_with(&self, call: String, extra: Option<OrdeloError>) -> Result<usize> {
        self.calls.lock().unwrap().push(call);
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.lock().unwrap().clone().or(extra);
        match failure {
            Some(err) => Err(err),
            None => Ok(n),
        }
    }
}

#[async_trait]
impl RecipeSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_random(&self, count: u32) -> Result<Vec<Recipe>> {
        let n = self.record("random".into()).await?;
        Ok((1..=u64::from(count))
            .map(|i| full_recipe(1000 + i, format!("random {i} v{n}")))
            .collect())
    }

    async fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        let n = self.record(format!("search:{query}")).await?;
        Ok(vec![
            full_recipe(1, format!("{query} v{n}")),
            full_recipe(2, format!("{query} bake v{n}")),
        ])
    }

    async fn by_cuisine(&self, cuisine: &str) -> Result<Vec<Recipe>> {
        let n = self.record(format!("cuisine:{cuisine}")).await?;
        Ok(vec![
            full_recipe(10, format!("{cuisine} classic v{n}")),
            // Summary only: needs a detail fetch.
            Recipe::new(11, format!("{cuisine} summary v{n}")),
        ])
    }

    async fn by_id(&self, id: RecipeId) -> Result<Recipe> {
        let detail_failure = self.detail_failure.lock().unwrap().clone();
        let n = self.record_with(format!("by_id:{id}"), detail_failure).await?;
        Ok(full_recipe(id, format!("recipe {id} v{n}")))
    }
}

pub fn full_recipe(id: RecipeId, title: impl Into<String>) -> Recipe {
    Recipe::new(id, title)
        .with_ingredients(vec![Ingredient::new("salt", 1.0, "tsp")])
        .with_instructions(json!([{ "name": "", "steps": [{ "number": 1, "step": "Cook." }] }]))
}

// ============================================================================
// Gateway harness
// ============================================================================

pub struct Harness {
    pub gateway: RecipeGateway,
    pub source: Arc<MockSource>,
    pub clock: ManualClock,
    pub usage: Arc<MemoryUsageStorage>,
}

impl Harness {
    /// Default limits and windows.
    pub fn new() -> Self {
        Self::with(UsageLimits::default(), CacheWindows::default())
    }

    pub fn with(limits: UsageLimits, windows: CacheWindows) -> Self {
        let clock = ManualClock::new(morning());
        let source = MockSource::new();
        let usage = Arc::new(MemoryUsageStorage::new());
        let gateway = RecipeGateway::builder()
            .source(source.clone())
            .in_memory_store()
            .usage_storage(usage.clone())
            .limits(limits)
            .windows(windows)
            .retry(RetryConfig::disabled())
            .batch_size(4)
            .clock(Arc::new(clock.clone()))
            .build()
            .expect("gateway should build");
        Self {
            gateway,
            source,
            clock,
            usage,
        }
    }

    /// Push the tracker into cache-only mode.
    pub fn exhaust_quota(&self) {
        let threshold = self.gateway.tracker().limits().cache_only_threshold;
        self.gateway.tracker().increment(threshold);
        assert!(!self.gateway.tracker().can_make_call());
    }

    pub fn usage_count(&self) -> u32 {
        self.gateway.api_usage_info().state.count
    }

    pub fn today(&self) -> String {
        self.clock.today()
    }
}

/// 09:00 local time on a fixed day, so advances of a few hours stay on the
/// same calendar day.
pub fn morning() -> DateTime<Utc> {
    Local
        .with_ymd_and_hms(2024, 5, 6, 9, 0, 0)
        .single()
        .expect("unambiguous local time")
        .with_timezone(&Utc)
}

/// Poll `check` until it returns true, failing after about two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
