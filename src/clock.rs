//! Wall-clock source for window keys and result timestamps.
//!
//! Entry expiry uses `tokio::time::Instant` instead, so only calendar
//! concerns (hour buckets, `reset_at`, `generated_at`) go through here.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use std::sync::{Mutex, MutexGuard};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System UTC clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.lock() = at;
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.lock() += by;
    }

    // Writes are single assignments, so a poisoned value is still whole.
    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }
}

/// Start of the UTC hour containing `at`.
pub fn hour_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(ChronoDuration::hours(1)).unwrap_or(at)
}

/// Start of the next UTC hour after `at`.
pub fn next_hour(at: DateTime<Utc>) -> DateTime<Utc> {
    hour_start(at) + ChronoDuration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hour_bounds() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 37, 12).unwrap();
        assert_eq!(hour_start(at), Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap());
        assert_eq!(next_hour(at), Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap());
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(ChronoDuration::minutes(2));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 3, 10, 0, 1, 0).unwrap());
    }

    #[test]
    fn manual_clock_survives_poisoning() {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let clock = std::sync::Arc::new(ManualClock::new(start));
        let held = clock.clone();
        let joined = std::thread::spawn(move || {
            let _now = held.now.lock().unwrap();
            panic!("test thread dies holding the clock");
        })
        .join();
        assert!(joined.is_err());
        assert!(clock.now.is_poisoned());

        clock.advance(ChronoDuration::minutes(30));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 3, 9, 12, 30, 0).unwrap());
        let later = Utc.with_ymd_and_hms(2024, 3, 9, 15, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
