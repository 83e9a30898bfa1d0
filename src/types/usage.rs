//! Daily API usage state

use serde::{Deserialize, Serialize};

/// Persisted usage counter for the current day.
///
/// Serialized with camelCase keys so the stored blob keeps the shape
/// `{ date, count, cacheOnlyMode, lastReset }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageState {
    /// Local calendar day of the last write, `YYYY-MM-DD`.
    pub date: String,
    /// Remote calls counted today.
    pub count: u32,
    /// Set once `count` reaches the cache-only threshold; cleared only by
    /// date rollover.
    pub cache_only_mode: bool,
    /// Milliseconds since the Unix epoch of the last reset.
    pub last_reset: i64,
}

impl UsageState {
    /// A zeroed state for `date`.
    pub fn fresh(date: impl Into<String>, now_millis: i64) -> Self {
        Self {
            date: date.into(),
            count: 0,
            cache_only_mode: false,
            last_reset: now_millis,
        }
    }
}

/// Usage snapshot for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    /// Mirrors `cache_only_mode`.
    pub is_limited: bool,
    #[serde(flatten)]
    pub state: UsageState,
    /// Calls left before the hard daily limit.
    pub remaining: u32,
    pub daily_limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_serializes_with_camel_case_keys() {
        let state = UsageState::fresh("2024-03-01", 1_709_251_200_000);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["cacheOnlyMode"], false);
        assert_eq!(json["lastReset"], 1_709_251_200_000_i64);
    }

    #[test]
    fn status_flattens_state() {
        let status = UsageStatus {
            is_limited: true,
            state: UsageState {
                date: "2024-03-01".into(),
                count: 460,
                cache_only_mode: true,
                last_reset: 0,
            },
            remaining: 40,
            daily_limit: 500,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isLimited"], true);
        assert_eq!(json["count"], 460);
        assert_eq!(json["remaining"], 40);
    }
}
