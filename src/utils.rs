//! Utility functions for the league engine

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use uuid::Uuid;

use crate::types::PlayerId;

/// Generate a new unique entity ID
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Order a player pair canonically so both submission orders resolve to the
/// same match row. Ordering is by player id.
pub fn canonical_pair(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Whether the given date is the last day of its month
pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    match date.succ_opt() {
        Some(next) => next.month() != date.month(),
        None => true,
    }
}

/// The (year, month) following the given season month; December rolls the year
pub fn next_season_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Display name for a season, e.g. "August 2026"
pub fn season_display_name(year: i32, month: u32) -> String {
    match NaiveDate::from_ymd_opt(year, month, 1) {
        Some(date) => date.format("%B %Y").to_string(),
        None => format!("{}-{:02}", year, month),
    }
}
