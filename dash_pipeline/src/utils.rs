//! Utility functions for the dash_pipeline crate

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// English day names, Monday first
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Parse the date/time representations found in source files into a date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DDTHH:MM:SS`
/// and RFC 3339 timestamps; the time of day is discarded.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Full English name of a weekday
pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAY_NAMES[day.num_days_from_monday() as usize]
}

/// Calendar month as `YYYY-MM`
pub fn month_period(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Index at which a chronological split puts the first held-out row:
/// `floor(train_fraction * len)`.
pub fn split_boundary(len: usize, train_fraction: f64) -> Result<usize> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(PipelineError::InvalidParameter(format!(
            "Train fraction must be between 0 and 1 (exclusive), got {train_fraction}"
        )));
    }
    Ok((len as f64 * train_fraction).floor() as usize)
}

/// Shortest series whose chronological split keeps at least one row on
/// each side
pub fn min_split_len(train_fraction: f64) -> Result<usize> {
    let mut len = ((1.0 / train_fraction).floor() as usize).max(2);
    while len < usize::MAX {
        let boundary = split_boundary(len, train_fraction)?;
        if boundary > 0 && boundary < len {
            break;
        }
        len += 1;
    }
    Ok(len)
}

/// Consecutive daily dates following `last`
pub fn future_dates(last: NaiveDate, horizon: usize) -> Vec<NaiveDate> {
    (1..=horizon as i64)
        .map(|offset| last + Duration::days(offset))
        .collect()
}
