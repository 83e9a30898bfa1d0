//! Daily API usage tracking.
//!
//! [`UsageTracker`] counts remote calls per local calendar day against two
//! soft caps: a cache-only threshold, past which no new calls are attempted,
//! and a hard daily limit. State is persisted through [`UsageStorage`] so
//! the count survives restarts.

mod storage;
mod tracker;

pub use storage::{DEFAULT_USAGE_FILE, FileUsageStorage, MemoryUsageStorage, UsageStorage};
pub use tracker::{
    DEFAULT_CACHE_ONLY_THRESHOLD, DEFAULT_DAILY_LIMIT, UsageLimits, UsageTracker,
};
