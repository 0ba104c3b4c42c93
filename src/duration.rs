//! Conversion of merge latency into business-hours-adjusted seconds.

use chrono::{DateTime, Utc};

/// Length of the non-working block assumed for every day (16 hours).
pub const NON_WORKING_PERIOD_SECS: i64 = 16 * 60 * 60;

/// Subtracts one non-working period for every full 16 hours in `raw_seconds`.
///
/// This is a coarse approximation: the periods are not aligned to calendar days or
/// weekends. Historical metric values were produced with exactly this arithmetic.
pub fn normalize(raw_seconds: i64) -> i64 {
    let periods = raw_seconds.div_euclid(NON_WORKING_PERIOD_SECS);
    raw_seconds - periods * NON_WORKING_PERIOD_SECS
}

/// Elapsed whole seconds from `start` to `end`, rounded up.
pub fn raw_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) > 0)
}
