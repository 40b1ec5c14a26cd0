//! Timestamp utilities
//!
//! Notification and evidence timestamps are library-local wall-clock times
//! without an offset, so everything here works on `NaiveDateTime`.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

/// Get current local timestamp
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Source of "now" for grace-period evaluation and aggregation stamps
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        now()
    }
}

/// Clock pinned to a single instant (tests, replays)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Midnight at the start of `date`
pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

/// Half-open `[start, end)` bounds covering every day from `from` to `to` inclusive
pub fn day_span(from: NaiveDate, to: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (start_of_day(from), start_of_day(to) + Duration::days(1))
}

/// Inclusive list of calendar days from `from` to `to`
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days().take_while(|d| *d <= to).collect()
}

/// Round to two decimal places (percentages)
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to one decimal place (report percentages)
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
