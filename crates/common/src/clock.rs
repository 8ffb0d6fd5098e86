//! Wall-clock sources.
//!
//! Segment file names carry the local time at which the segment was
//! opened. The clock is a trait so the capture engine can be driven by a
//! controllable clock in tests.

use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDateTime};

/// Source of local wall-clock time.
pub trait WallClock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// The system's local clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
///
/// Every call to [`WallClock::now`] returns the current value and then
/// advances it by `step`, so consecutive readings are distinct when `step`
/// is non-zero.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<NaiveDateTime>,
    step: Duration,
}

impl ManualClock {
    /// A clock frozen at `start`.
    pub fn fixed(start: NaiveDateTime) -> Self {
        Self::stepping(start, Duration::zero())
    }

    /// A clock starting at `start` that advances by `step` per reading.
    pub fn stepping(start: NaiveDateTime, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: NaiveDateTime) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = at;
    }

    /// Read the clock without advancing it.
    pub fn peek(&self) -> NaiveDateTime {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let reading = *current;
        *current = reading + self.step;
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_fixed_clock_does_not_move() {
        let clock = ManualClock::fixed(at(10, 0, 0));
        assert_eq!(clock.now(), at(10, 0, 0));
        assert_eq!(clock.now(), at(10, 0, 0));
    }

    #[test]
    fn test_stepping_clock_advances_per_reading() {
        let clock = ManualClock::stepping(at(10, 0, 0), Duration::seconds(5));
        assert_eq!(clock.now(), at(10, 0, 0));
        assert_eq!(clock.now(), at(10, 0, 5));
        assert_eq!(clock.peek(), at(10, 0, 10));
    }

    #[test]
    fn test_set_moves_clock() {
        let clock = ManualClock::fixed(at(10, 0, 0));
        clock.set(at(23, 59, 59));
        assert_eq!(clock.now(), at(23, 59, 59));
    }

    #[test]
    fn test_system_clock_is_close_to_local_time() {
        let before = Local::now().naive_local();
        let reading = SystemClock.now();
        assert!(reading >= before);
    }
}
