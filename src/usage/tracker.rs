//! Daily call counter with cache-only and hard limits.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::UsageStorage;
use crate::clock::Clock;
use crate::types::{UsageState, UsageStatus};
use crate::{OrdeloError, Result};

/// Hard ceiling on remote calls per day.
pub const DEFAULT_DAILY_LIMIT: u32 = 500;

/// Count at which the tracker stops allowing new remote calls.
pub const DEFAULT_CACHE_ONLY_THRESHOLD: u32 = 450;

/// The two soft caps enforced by [`UsageTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageLimits {
    pub daily_limit: u32,
    pub cache_only_threshold: u32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            cache_only_threshold: DEFAULT_CACHE_ONLY_THRESHOLD,
        }
    }
}

impl UsageLimits {
    /// Build limits, rejecting a threshold above the hard limit.
    pub fn new(daily_limit: u32, cache_only_threshold: u32) -> Result<Self> {
        let limits = Self {
            daily_limit,
            cache_only_threshold,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_only_threshold > self.daily_limit {
            return Err(OrdeloError::InvalidInput(format!(
                "cache-only threshold {} exceeds daily limit {}",
                self.cache_only_threshold, self.daily_limit
            )));
        }
        Ok(())
    }
}

/// Process-wide usage counter.
///
/// Every public method first runs [`init`](Self::init), so a state from an
/// earlier day is reset before it is evaluated. Storage is read once, on
/// first use; after that the in-memory copy is authoritative and every
/// change is written through. Checks on the request path therefore do no
/// file IO. Read-modify-write cycles are serialized by the mutex guarding
/// that copy, so concurrent increments within one process never undercount.
///
/// Storage failures never surface: they are logged and the tracker keeps
/// working from the state it computed.
pub struct UsageTracker {
    storage: Arc<dyn UsageStorage>,
    clock: Arc<dyn Clock>,
    limits: UsageLimits,
    state: Mutex<Option<UsageState>>,
}

impl UsageTracker {
    pub fn new(storage: Arc<dyn UsageStorage>, clock: Arc<dyn Clock>, limits: UsageLimits) -> Self {
        Self {
            storage,
            clock,
            limits,
            state: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    /// Load today's state, resetting it on date rollover.
    ///
    /// Idempotent; safe to call before every check.
    pub fn init(&self) -> UsageState {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.load_today(&mut current).clone()
    }

    /// Whether a remote call may be made now.
    pub fn can_make_call(&self) -> bool {
        let state = self.init();
        !state.cache_only_mode && state.count < self.limits.daily_limit
    }

    /// Whether the tracker has entered cache-only mode today.
    pub fn is_cache_only_mode(&self) -> bool {
        self.init().cache_only_mode
    }

    /// Add `n` calls to today's count and persist.
    ///
    /// Returns the updated state. Logs a warning the first time the count
    /// crosses the cache-only threshold.
    pub fn increment(&self, n: u32) -> UsageState {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.load_today(&mut current);

        let was_cache_only = state.cache_only_mode;
        state.count = state.count.saturating_add(n);
        state.cache_only_mode = was_cache_only || state.count >= self.limits.cache_only_threshold;

        if state.cache_only_mode && !was_cache_only {
            warn!(
                count = state.count,
                daily_limit = self.limits.daily_limit,
                "API daily limit approaching, switching to cache-only mode"
            );
        }

        self.persist(state);
        state.clone()
    }

    /// Calls left before the hard daily limit.
    pub fn remaining(&self) -> u32 {
        self.limits.daily_limit.saturating_sub(self.init().count)
    }

    /// Snapshot for display.
    pub fn status(&self) -> UsageStatus {
        let state = self.init();
        UsageStatus {
            is_limited: state.cache_only_mode,
            remaining: self.limits.daily_limit.saturating_sub(state.count),
            daily_limit: self.limits.daily_limit,
            state,
        }
    }

    /// Force a zeroed counter for today.
    pub fn reset(&self) -> UsageState {
        let mut current = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = UsageState::fresh(self.clock.today(), self.clock.now_millis());
        self.persist(&state);
        current.insert(state).clone()
    }

    /// Today's state in `current`, loading it from storage on first use
    /// and starting a fresh day on rollover.
    fn load_today<'a>(&self, current: &'a mut Option<UsageState>) -> &'a mut UsageState {
        let today = self.clock.today();
        let loaded = match current.take() {
            Some(state) => Some(state),
            None => match self.storage.load() {
                Ok(stored) => stored,
                Err(e) => {
                    warn!(error = %e, "failed to load usage state");
                    None
                }
            },
        };

        let state = match loaded {
            Some(mut state) if state.date == today => {
                // Limits may have been lowered since the state was written.
                state.cache_only_mode |= state.count >= self.limits.cache_only_threshold;
                state
            }
            previous => {
                if let Some(old) = previous {
                    debug!(previous_date = %old.date, previous_count = old.count, "usage counter reset for new day");
                }
                let state = UsageState::fresh(today, self.clock.now_millis());
                self.persist(&state);
                state
            }
        };
        current.insert(state)
    }

    fn persist(&self, state: &UsageState) {
        if let Err(e) = self.storage.save(state) {
            warn!(error = %e, "failed to persist usage state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::usage::{FileUsageStorage, MemoryUsageStorage};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker(limits: UsageLimits) -> (UsageTracker, ManualClock, Arc<MemoryUsageStorage>) {
        let clock = ManualClock::starting_now();
        let storage = Arc::new(MemoryUsageStorage::new());
        let tracker = UsageTracker::new(storage.clone(), Arc::new(clock.clone()), limits);
        (tracker, clock, storage)
    }

    #[test]
    fn first_init_creates_persisted_state() {
        let (tracker, clock, storage) = tracker(UsageLimits::default());
        let state = tracker.init();
        assert_eq!(state.count, 0);
        assert_eq!(state.date, clock.today());
        assert_eq!(storage.load().unwrap(), Some(state));
    }

    #[test]
    fn cache_only_mode_flips_once_at_threshold_and_stays() {
        let (tracker, _, _) = tracker(UsageLimits::new(10, 5).unwrap());
        let mut previous = 0;
        for i in 1..=8 {
            let state = tracker.increment(1);
            assert!(state.count >= previous);
            previous = state.count;
            assert_eq!(state.cache_only_mode, i >= 5, "after {i} calls");
        }
        assert!(!tracker.can_make_call());
        assert!(tracker.is_cache_only_mode());
    }

    #[test]
    fn can_make_call_until_threshold() {
        let (tracker, _, _) = tracker(UsageLimits::new(10, 3).unwrap());
        assert!(tracker.can_make_call());
        tracker.increment(2);
        assert!(tracker.can_make_call());
        tracker.increment(1);
        assert!(!tracker.can_make_call());
    }

    #[test]
    fn hard_limit_blocks_even_without_cache_only() {
        let (tracker, _, _) = tracker(UsageLimits::new(3, 3).unwrap());
        tracker.increment(3);
        assert!(!tracker.can_make_call());
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let (tracker, _, _) = tracker(UsageLimits::new(10, 8).unwrap());
        tracker.increment(25);
        assert_eq!(tracker.remaining(), 0);
    }

    #[test]
    fn date_rollover_resets_before_evaluating() {
        let (tracker, clock, _) = tracker(UsageLimits::new(10, 5).unwrap());
        tracker.increment(7);
        assert!(!tracker.can_make_call());

        clock.advance(Duration::days(1));
        assert!(tracker.can_make_call());
        let status = tracker.status();
        assert_eq!(status.state.count, 0);
        assert!(!status.is_limited);
        assert_eq!(status.state.date, clock.today());
        assert_eq!(status.state.last_reset, clock.now_millis());
    }

    #[test]
    fn increment_after_rollover_starts_from_zero() {
        let (tracker, clock, _) = tracker(UsageLimits::new(10, 5).unwrap());
        tracker.increment(6);
        clock.advance(Duration::days(2));
        let state = tracker.increment(1);
        assert_eq!(state.count, 1);
        assert!(!state.cache_only_mode);
    }

    #[test]
    fn stale_persisted_state_is_reset_on_load() {
        let clock = ManualClock::starting_now();
        let storage = Arc::new(MemoryUsageStorage::with_state(UsageState {
            date: "1999-12-31".into(),
            count: 499,
            cache_only_mode: true,
            last_reset: 0,
        }));
        let tracker = UsageTracker::new(storage, Arc::new(clock), UsageLimits::default());
        assert_eq!(tracker.remaining(), DEFAULT_DAILY_LIMIT);
        assert!(!tracker.is_cache_only_mode());
    }

    #[test]
    fn reset_zeroes_todays_counter() {
        let (tracker, _, _) = tracker(UsageLimits::new(10, 5).unwrap());
        tracker.increment(9);
        let state = tracker.reset();
        assert_eq!(state.count, 0);
        assert!(tracker.can_make_call());
    }

    #[test]
    fn count_survives_a_new_tracker_instance() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::starting_now();
        let path = dir.path().join("usage.json");

        let first = UsageTracker::new(
            Arc::new(FileUsageStorage::new(&path)),
            Arc::new(clock.clone()),
            UsageLimits::default(),
        );
        first.increment(4);

        let second = UsageTracker::new(
            Arc::new(FileUsageStorage::new(&path)),
            Arc::new(clock),
            UsageLimits::default(),
        );
        assert_eq!(second.init().count, 4);
    }

    /// Memory storage that counts how often it is read.
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryUsageStorage,
        loads: AtomicUsize,
        saves: AtomicUsize,
    }

    impl UsageStorage for CountingStorage {
        fn load(&self) -> Result<Option<UsageState>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load()
        }

        fn save(&self, state: &UsageState) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(state)
        }
    }

    #[test]
    fn checks_read_storage_once_and_writes_through() {
        let clock = ManualClock::starting_now();
        let storage = Arc::new(CountingStorage::default());
        let tracker = UsageTracker::new(storage.clone(), Arc::new(clock.clone()), UsageLimits::default());

        for _ in 0..20 {
            assert!(tracker.can_make_call());
            tracker.status();
            tracker.remaining();
        }
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);

        let saves = storage.saves.load(Ordering::SeqCst);
        tracker.increment(2);
        assert_eq!(storage.saves.load(Ordering::SeqCst), saves + 1);
        assert_eq!(storage.inner.load().unwrap().unwrap().count, 2);

        // Rollover is detected from the in-memory copy and persisted.
        clock.advance(Duration::days(1));
        assert_eq!(tracker.init().count, 0);
        assert_eq!(storage.loads.load(Ordering::SeqCst), 1);
        assert_eq!(storage.inner.load().unwrap().unwrap().date, clock.today());
    }

    #[test]
    fn threshold_above_limit_is_rejected() {
        assert!(UsageLimits::new(10, 11).is_err());
        assert!(UsageLimits::new(10, 10).is_ok());
    }
}
