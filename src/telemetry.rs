//! Telemetry metric name constants.
//!
//! Centralised metric names for cache and quota operations. Consumers
//! install their own `metrics` recorder (e.g. prometheus, statsd); without
//! a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `ordelo_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `operation`: gateway operation ("random", "search", "cuisine", "by_id")
//! - `collection`: store collection ("recipes", "searches", "cuisines")
//! - `status`: "ok" or "error"

/// Requests answered from a fresh cache record.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "ordelo_cache_hits_total";

/// Requests with no usable cache record.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "ordelo_cache_misses_total";

/// Requests answered with a stale record (background refresh or cache-only).
///
/// Labels: `operation`.
pub const STALE_SERVED_TOTAL: &str = "ordelo_stale_served_total";

/// Remote calls that reached the recipe source (after dedupe).
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REMOTE_CALLS_TOTAL: &str = "ordelo_remote_calls_total";

/// Retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "ordelo_retries_total";

/// Callers that joined an already in-flight request.
///
/// Labels: `path`.
pub const DEDUP_JOINS_TOTAL: &str = "ordelo_dedup_joins_total";

/// Requests refused because the daily quota forbids a call.
///
/// Labels: `operation`.
pub const QUOTA_BLOCKED_TOTAL: &str = "ordelo_quota_blocked_total";

/// Records removed by cache maintenance.
///
/// Labels: `collection`.
pub const CLEANUP_DELETED_TOTAL: &str = "ordelo_cleanup_deleted_total";
