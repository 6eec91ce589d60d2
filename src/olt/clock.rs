//! Injectable wall clock.
//!
//! The pool never calls `Utc::now()` directly so the reaper can be driven
//! deterministically in tests with [`ManualClock`].

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::days(36_500));
        if let Ok(mut now) = self.now.lock() {
            *now = now.checked_add_signed(delta).unwrap_or(*now);
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Whole seconds between `earlier` and `later`, zero if `later` is before `earlier`.
pub(crate) fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_secs(301));
        assert_eq!(elapsed_between(start, clock.now()), Duration::from_secs(301));
    }

    #[test]
    fn test_elapsed_never_negative() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(elapsed_between(clock.now(), start), Duration::ZERO);
    }
}
