//! Clock - Injectable Time Source
//!
//! Every component that needs "now" takes a `Clock` handle, so lifecycle
//! rules (working-memory expiry, idle triggers) are exercised in tests by
//! advancing a `SimClock` instead of sleeping.

use chrono::{DateTime, Utc};
use mnema_core::sim::SimClock;

/// A time source that is either the system clock or a simulated clock.
#[derive(Debug, Clone)]
pub enum Clock {
    /// Wall-clock time (`Utc::now`)
    System,
    /// Simulated time, advanced explicitly
    Sim(SimClock),
}

impl Clock {
    /// Create a simulated clock starting at the given `DateTime`.
    #[must_use]
    pub fn sim_at(dt: DateTime<Utc>) -> Self {
        Self::Sim(SimClock::at_datetime(dt))
    }

    /// Get the current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Sim(clock) => clock.now(),
        }
    }

    /// Get the current time in milliseconds since epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        match self {
            Self::System => Utc::now().timestamp_millis().max(0) as u64,
            Self::Sim(clock) => clock.now_ms(),
        }
    }

    /// Get the underlying `SimClock`, if simulated.
    #[must_use]
    pub fn as_sim(&self) -> Option<&SimClock> {
        match self {
            Self::System => None,
            Self::Sim(clock) => Some(clock),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::System
    }
}

impl From<SimClock> for Clock {
    fn from(clock: SimClock) -> Self {
        Self::Sim(clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sim_clock_is_stable() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Clock::sim_at(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_sim_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = Clock::sim_at(start);
        clock.as_sim().unwrap().advance_secs(90);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = Clock::System;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
