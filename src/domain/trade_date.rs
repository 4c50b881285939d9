//! Trade date parsing and formatting.
//!
//! Upstream sources mix `YYYYMMDD` and `YYYY-MM-DD`; everything inside the crate
//! works on `NaiveDate` and only these helpers touch the string forms.

use crate::domain::error::ScreenerError;
use chrono::{Duration, NaiveDate};

pub fn parse_date(value: &str) -> Result<NaiveDate, ScreenerError> {
    let trimmed = value.trim();
    let format = if trimmed.contains('-') {
        "%Y-%m-%d"
    } else {
        "%Y%m%d"
    };
    NaiveDate::parse_from_str(trimmed, format).map_err(|_| ScreenerError::InvalidDate {
        value: value.to_string(),
    })
}

/// `YYYYMMDD`, used in output file names and storage keys.
pub fn compact(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// `YYYY-MM-DD`, used for SQLite text columns.
pub fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First calendar day of a history window ending at `trade_date`.
pub fn lookback_start(trade_date: NaiveDate, lookback_days: u32) -> NaiveDate {
    trade_date - Duration::days(i64::from(lookback_days))
}
