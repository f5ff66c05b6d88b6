//! Monthly date ranges and the event overlap predicate.
//!
//! A [`MonthRange`] is the inclusive UTC boundary of one calendar month:
//! `00:00:00.000` on day 1 through `23:59:59.999` on the last day. The same
//! predicate backs both the SQL filter in [`crate::db`] and the in-memory
//! filter [`events_overlapping_range`].

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use crate::models::Event;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidRangeError {
    #[error("Invalid month {0}: must be an integer between 1 and 12")]
    InvalidMonth(String),

    #[error("Invalid year {0}: must be an integer within the supported calendar")]
    InvalidYear(String),

    #[error("Invalid month selector {0:?}: expected YYYY-MM (e.g. 2024-05)")]
    InvalidFormat(String),
}

/// Inclusive UTC boundary of a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MonthRange {
    /// Resolve the range for `month` (1-12) of `year`.
    pub fn resolve(month: u32, year: i32) -> Result<Self, InvalidRangeError> {
        if !(1..=12).contains(&month) {
            return Err(InvalidRangeError::InvalidMonth(month.to_string()));
        }

        let invalid_year = || InvalidRangeError::InvalidYear(year.to_string());

        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid_year)?;
        let (next_year, next_month) = if month == 12 {
            (year.checked_add(1).ok_or_else(invalid_year)?, 1)
        } else {
            (year, month + 1)
        };

        // Day 0 of the following month is the last day of this one.
        let last_day = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .ok_or_else(invalid_year)?;

        let start = first_day.and_time(NaiveTime::MIN).and_utc();
        let end = last_day
            .and_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(invalid_year)?
            .and_utc();

        Ok(MonthRange { start, end })
    }

    /// Parse `month` and `year` as they arrive from a query string.
    pub fn parse(month: &str, year: &str) -> Result<Self, InvalidRangeError> {
        let month_num = month
            .trim()
            .parse::<u32>()
            .map_err(|_| InvalidRangeError::InvalidMonth(month.to_string()))?;
        let year_num = year
            .trim()
            .parse::<i32>()
            .map_err(|_| InvalidRangeError::InvalidYear(year.to_string()))?;

        Self::resolve(month_num, year_num)
    }

    /// Parse a compact `YYYY-MM` selector.
    pub fn from_month_str(selector: &str) -> Result<Self, InvalidRangeError> {
        let invalid = || InvalidRangeError::InvalidFormat(selector.to_string());

        let (year, month) = selector.split_once('-').ok_or_else(invalid)?;
        let well_formed = year.len() == 4
            && month.len() == 2
            && year.bytes().all(|b| b.is_ascii_digit())
            && month.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(invalid());
        }

        Self::parse(month, year)
    }

    /// Inclusive membership test.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Whether a span starting at `start` (and ending at `end`, if known)
    /// intersects this month.
    ///
    /// Matches when the start falls inside the range, when the end falls
    /// inside the range, or when the span covers the whole range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
        if self.contains(start) {
            return true;
        }
        match end {
            Some(end) => self.contains(end) || (start <= self.start && end >= self.end),
            None => false,
        }
    }

    pub fn start_ms(&self) -> i64 {
        self.start.timestamp_millis()
    }

    pub fn end_ms(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// Events intersecting `range`, ordered by start time.
///
/// The sort is stable, so events sharing a start time keep their input order.
pub fn events_overlapping_range(events: &[Event], range: &MonthRange) -> Vec<Event> {
    let mut matching: Vec<Event> = events
        .iter()
        .filter(|e| range.overlaps(e.start_date_time, e.end_date_time))
        .cloned()
        .collect();
    matching.sort_by_key(|e| e.start_date_time);
    matching
}
