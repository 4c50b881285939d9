//! Daily OHLCV bar representations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical daily bar. Volume and amount are real-valued after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
}

impl OhlcvBar {
    /// low <= {open, close} <= high, with no NaN components.
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| p.is_nan()) {
            return false;
        }
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }

    /// Percent change of close against a previous close.
    pub fn pct_change(&self, prev_close: f64) -> f64 {
        (self.close - prev_close) / prev_close * 100.0
    }
}

/// A daily row as delivered by a historical source: raw prices plus optional
/// forward-adjusted variants.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoricalBar {
    pub code: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
    pub open_adj: Option<f64>,
    pub high_adj: Option<f64>,
    pub low_adj: Option<f64>,
    pub close_adj: Option<f64>,
}

impl HistoricalBar {
    /// Project onto canonical OHLC, preferring adjusted values field by field.
    pub fn to_canonical(&self) -> OhlcvBar {
        OhlcvBar {
            code: self.code.clone(),
            date: self.date,
            open: self.open_adj.unwrap_or(self.open),
            high: self.high_adj.unwrap_or(self.high),
            low: self.low_adj.unwrap_or(self.low),
            close: self.close_adj.unwrap_or(self.close),
            volume: self.volume,
            amount: self.amount,
        }
    }
}

impl From<OhlcvBar> for HistoricalBar {
    fn from(bar: OhlcvBar) -> Self {
        Self {
            code: bar.code,
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            amount: bar.amount,
            ..Default::default()
        }
    }
}
