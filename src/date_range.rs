//! Reference-date windows for report queries.
//!
//! The reporting interface filters with an inclusive `BETWEEN`, so the window
//! ends one day past the reference civil date.

use crate::types::{DateRange, Lookback, LookbackUnit};
use chrono::{DateTime, Days, Duration, Months, NaiveDate, Utc};
use chrono_tz::Tz;

/// How a UTC instant is turned into the civil date reports are keyed on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CivilClock {
    /// Proper zoned conversion.
    Zoned(Tz),
    /// Shift the instant forward by a fixed number of hours and take the UTC
    /// calendar date. Only right for the offset it was tuned for and may be
    /// a day off around midnight.
    FixedShift(i64),
}

impl Default for CivilClock {
    fn default() -> Self {
        CivilClock::Zoned(chrono_tz::Asia::Tokyo)
    }
}

impl CivilClock {
    pub fn civil_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            CivilClock::Zoned(tz) => instant.with_timezone(tz).date_naive(),
            CivilClock::FixedShift(hours) => instant
                .checked_add_signed(Duration::hours(*hours))
                .unwrap_or(instant)
                .date_naive(),
        }
    }
}

/// Compute the query window for `lookback` ending after the reference civil
/// date `D`.
///
/// - `end` is `D + 1 day`.
/// - Days: `start = end - N days`.
/// - Months: `start = D - N months`; a day-of-month that does not exist in
///   the target month is clamped to that month's last day.
///
/// Arithmetic saturates at the calendar limits instead of failing.
pub fn compute(reference: DateTime<Utc>, clock: &CivilClock, lookback: Lookback) -> DateRange {
    let today = clock.civil_date(reference);
    let end = today.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    let start = match lookback.unit {
        LookbackUnit::Days => end
            .checked_sub_days(Days::new(u64::from(lookback.amount)))
            .unwrap_or(NaiveDate::MIN),
        LookbackUnit::Months => today
            .checked_sub_months(Months::new(lookback.amount))
            .unwrap_or(NaiveDate::MIN),
    };
    DateRange::clamped(start, end)
}
