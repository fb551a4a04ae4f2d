//! Calendar feature engineering
//!
//! Derives the eight integer calendar attributes used as model inputs from
//! the timestamp of each observation.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Column names of the derived features, in output order.
///
/// `weekofmonth` is the 1-based week within the month, `(day - 1) / 7 + 1`,
/// not the day of the month.
pub const CALENDAR_COLUMNS: [&str; 8] = [
    "hour",
    "dayofweek",
    "quarter",
    "month",
    "year",
    "dayofyear",
    "weekofmonth",
    "weekofyear",
];

/// Default feature subset fed to the preprocessor
pub const DEFAULT_FEATURE_COLUMNS: [&str; 4] = ["month", "hour", "dayofweek", "dayofyear"];

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Quarter (1-4)
    pub quarter: u32,
    /// Month (1-12)
    pub month: u32,
    pub year: i32,
    /// Day of year (1-366)
    pub day_of_year: u32,
    /// Week of month (1-5), counted from the first day of the month; days
    /// 1-7 are week 1
    pub week_of_month: u32,
    /// ISO 8601 week number (1-53)
    pub week_of_year: u32,
}

impl CalendarFeatures {
    pub fn from_timestamp(timestamp: NaiveDateTime) -> Self {
        let month = timestamp.month();
        Self {
            hour: timestamp.hour(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
            quarter: (month - 1) / 3 + 1,
            month,
            year: timestamp.year(),
            day_of_year: timestamp.ordinal(),
            week_of_month: (timestamp.day() - 1) / 7 + 1,
            week_of_year: timestamp.iso_week().week(),
        }
    }

    /// Values in `CALENDAR_COLUMNS` order
    pub fn values(&self) -> [i64; 8] {
        [
            self.hour as i64,
            self.day_of_week as i64,
            self.quarter as i64,
            self.month as i64,
            self.year as i64,
            self.day_of_year as i64,
            self.week_of_month as i64,
            self.week_of_year as i64,
        ]
    }

    pub fn to_cells(&self) -> Vec<String> {
        self.values().iter().map(i64::to_string).collect()
    }
}

/// Timestamp parser for the source's index column
#[derive(Debug, Clone, Default)]
pub struct TimestampParser {
    format: Option<String>,
}

impl TimestampParser {
    /// With `None`, common ISO layouts, RFC 3339 and bare dates are accepted
    pub fn new(format: Option<String>) -> Self {
        Self { format }
    }

    pub fn parse(&self, raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if let Some(format) = &self.format {
            return NaiveDateTime::parse_from_str(raw, format).ok();
        }

        TIMESTAMP_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
            // offset-aware stamps keep their wall-clock time
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }
}
