//! ordelo-cache - quota-aware recipe cache for the Spoonacular API
//!
//! This crate sits between an application and a metered recipe API. It
//! keeps responses in a local SQLite database, counts remote calls against
//! a daily budget, collapses identical in-flight requests, retries
//! transient failures with backoff, and decides per call whether to answer
//! from cache, refresh in the background, or refuse.
//!
//! # Example
//!
//! ```rust,no_run
//! use ordelo_cache::RecipeGateway;
//!
//! #[tokio::main]
//! async fn main() -> ordelo_cache::Result<()> {
//!     let gateway = RecipeGateway::builder()
//!         .api_key("your-spoonacular-key")
//!         .build()?;
//!     let _maintenance = gateway.start_maintenance(ordelo_cache::DEFAULT_CLEANUP_INTERVAL);
//!
//!     let results = gateway.search_recipes("pasta").await?;
//!     for recipe in &results.data {
//!         println!("{} ({})", recipe.title, recipe.id);
//!     }
//!
//!     let usage = gateway.api_usage_info();
//!     println!("{} calls left today", usage.remaining);
//!     Ok(())
//! }
//! ```
//!
//! # From a config file
//!
//! ```rust,no_run
//! use ordelo_cache::{Config, RecipeGatewayBuilder};
//!
//! # fn main() -> ordelo_cache::Result<()> {
//! let config = Config::load(None)?;
//! let gateway = RecipeGatewayBuilder::from_config(&config)?.build()?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod gateway;
pub mod maintenance;
pub mod source;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod usage;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use dedup::{DeduplicationRegistry, RequestKey};
pub use error::{OrdeloError, Result};
pub use gateway::{CacheKind, CacheWindows, RecipeGateway, RecipeGatewayBuilder};
pub use maintenance::{
    CacheMaintenance, CleanupReport, DEFAULT_CLEANUP_INTERVAL, MaintenanceHandle,
};
pub use source::{RecipeSource, RetryConfig, RetryingRecipeSource, SpoonacularClient, with_retry};
pub use store::{Collection, RecipeStore, StoredRecord};
pub use types::{Fetched, Ingredient, Origin, Recipe, RecipeId, UsageState, UsageStatus};
pub use usage::{
    FileUsageStorage, MemoryUsageStorage, UsageLimits, UsageStorage, UsageTracker,
};
