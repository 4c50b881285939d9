//! Intraday tick observations.

use chrono::{NaiveDate, NaiveTime};

/// One sub-daily observation. Numeric fields may be missing in source data.
#[derive(Debug, Clone, PartialEq)]
pub struct IntradayTick {
    pub code: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub price: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
}
