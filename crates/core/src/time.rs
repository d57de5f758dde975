use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Countdown values below this many seconds are shown as running low.
pub const LOW_TIME_THRESHOLD_SECS: u32 = 60;

/// A clock abstraction for deterministic time in services and tests.
///
/// `Manual` clocks share their instant between clones, so advancing one
/// handle is observed by every service holding a copy.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
    Manual(Arc<Mutex<DateTime<Utc>>>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    /// Returns a clock frozen at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns a shared clock starting at `at` that only moves via [`Clock::advance`].
    #[must_use]
    pub fn manual(at: DateTime<Utc>) -> Self {
        Self::Manual(Arc::new(Mutex::new(at)))
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
            Clock::Manual(shared) => *shared.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Move a fixed or manual clock forward by `delta`.
    ///
    /// Has no effect on `Clock::System`.
    pub fn advance(&mut self, delta: Duration) {
        match self {
            Clock::System => {}
            Clock::Fixed(t) => *t += delta,
            Clock::Manual(shared) => {
                let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
                *guard += delta;
            }
        }
    }
}

/// Render a countdown as `MM:SS`. Minutes are not wrapped into hours.
#[must_use]
pub fn format_remaining(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Whether a countdown should be flagged as running low.
#[must_use]
pub fn is_low_time(seconds: u32) -> bool {
    seconds < LOW_TIME_THRESHOLD_SECS
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_shared_between_clones() {
        let mut clock = Clock::manual(fixed_now());
        let observer = clock.clone();
        clock.advance(Duration::minutes(5));
        assert_eq!(observer.now(), fixed_now() + Duration::minutes(5));
    }

    #[test]
    fn fixed_clock_advances_only_its_copy() {
        let mut clock = fixed_clock();
        let copy = clock.clone();
        clock.advance(Duration::seconds(1));
        assert_eq!(copy.now(), fixed_now());
        assert_eq!(clock.now(), fixed_now() + Duration::seconds(1));
    }

    #[test]
    fn formats_countdown() {
        assert_eq!(format_remaining(0), "00:00");
        assert_eq!(format_remaining(59), "00:59");
        assert_eq!(format_remaining(5400), "90:00");
        assert!(is_low_time(59));
        assert!(!is_low_time(60));
    }
}
