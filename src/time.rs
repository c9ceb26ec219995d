//! Duration conversion helpers.

use std::time::Duration;

use chrono::TimeDelta;

pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

pub fn hours(n: u64) -> Duration {
    minutes(n * 60)
}

pub fn days(n: u64) -> Duration {
    hours(n * 24)
}

/// Convert a fractional hour count into a calendar offset, rounded to the
/// nearest second. `None` when chrono cannot represent it.
pub fn hours_to_offset(hours: f64) -> Option<TimeDelta> {
    let seconds = (hours * 3600.0).round();
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_seconds(seconds as i64)
}
