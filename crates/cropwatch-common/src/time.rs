//! Acquisition date handling for catalog searches.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{CropwatchError, CropwatchResult};

/// Default number of days added to the start date to close the search interval.
pub const DEFAULT_WINDOW_DAYS: u32 = 13;

/// Inclusive acquisition-date interval used to filter catalog items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SearchWindow {
    /// Interval running from `start` through `start + days`.
    pub fn from_date(start: NaiveDate, days: u32) -> CropwatchResult<Self> {
        let end = start
            .checked_add_signed(Duration::days(days as i64))
            .ok_or_else(|| {
                CropwatchError::InvalidInput(format!(
                    "search window of {} days from {} is past the supported calendar",
                    days, start
                ))
            })?;
        Ok(Self { start, end })
    }

    /// Parse a "YYYY-MM-DD" start date and build the interval.
    pub fn parse(date: &str, days: u32) -> CropwatchResult<Self> {
        Self::from_date(parse_date(date)?, days)
    }

    /// STAC `datetime` filter value, e.g.
    /// `2025-07-01T00:00:00Z/2025-07-14T23:59:59Z`.
    pub fn to_stac_interval(&self) -> String {
        format!(
            "{}T00:00:00Z/{}T23:59:59Z",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Parse a calendar date in "YYYY-MM-DD" form.
pub fn parse_date(s: &str) -> CropwatchResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| CropwatchError::InvalidInput(format!("invalid date '{}': {}", s, e)))
}
