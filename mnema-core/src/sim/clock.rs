//! SimClock - Simulated Time
//!
//! TigerStyle: deterministic, controllable time. Working-memory expiry and
//! idle triggers are exercised by advancing this clock, never by sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Notify;

use crate::constants::{SIM_TIME_ADVANCE_MS_MAX, TIME_MS_PER_SEC};

/// A simulated clock for deterministic testing.
///
/// Time only moves forward; all movement is explicit. Thread-safe via
/// `Arc<AtomicU64>`, so clones observe the same timeline.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Current time in milliseconds since epoch
    current_ms: Arc<AtomicU64>,
    /// Notify waiters when time advances
    notify: Arc<Notify>,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(0)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock starting at the given millisecond timestamp.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a clock starting at the given `DateTime`.
    #[must_use]
    pub fn at_datetime(dt: DateTime<Utc>) -> Self {
        Self::at_ms(dt.timestamp_millis().max(0) as u64)
    }

    /// Get current time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Get current time in seconds (truncated).
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_ms() / TIME_MS_PER_SEC
    }

    /// Get current time as `DateTime<Utc>`.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms() as i64)
            .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
    }

    /// Advance time by the given milliseconds, returning the new time.
    ///
    /// # Panics
    /// Panics if `ms` exceeds `SIM_TIME_ADVANCE_MS_MAX`.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        // Precondition
        assert!(
            ms <= SIM_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({SIM_TIME_ADVANCE_MS_MAX})"
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        let new_time = old_time.saturating_add(ms);

        self.notify.notify_waiters();

        // Postcondition
        assert!(new_time >= old_time, "time must not go backwards");
        new_time
    }

    /// Advance time by the given whole seconds.
    pub fn advance_secs(&self, secs: u64) -> u64 {
        self.advance_ms(secs * TIME_MS_PER_SEC)
    }

    /// Advance time by a chrono `Duration`.
    ///
    /// # Panics
    /// Panics if the duration is negative.
    pub fn advance(&self, duration: Duration) {
        assert!(duration >= Duration::zero(), "cannot go back in time");
        self.advance_ms(duration.num_milliseconds() as u64);
    }

    /// Set time to an absolute millisecond value.
    ///
    /// # Panics
    /// Panics if the new time is before the current time.
    pub fn set_ms(&self, ms: u64) {
        let current = self.now_ms();
        assert!(ms >= current, "cannot set time backwards: {ms} < {current}");

        self.current_ms.store(ms, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Set time to a `DateTime`.
    pub fn set(&self, time: DateTime<Utc>) {
        self.set_ms(time.timestamp_millis().max(0) as u64);
    }

    /// Get elapsed milliseconds since a given timestamp.
    ///
    /// # Panics
    /// Panics if `since` is in the future.
    #[must_use]
    pub fn elapsed_since(&self, since: u64) -> u64 {
        let current = self.now_ms();
        assert!(since <= current, "elapsed_since({since}) is in the future (now={current})");
        current - since
    }

    /// Wait until the clock reaches `target_ms` (driven by `advance_*` calls).
    pub async fn sleep_until_ms(&self, target_ms: u64) {
        while self.now_ms() < target_ms {
            self.notify.notified().await;
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}
