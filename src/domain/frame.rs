//! Per-code bar series with computed indicators.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

/// One code's ascending bars plus its indicator series.
///
/// Read-only once built; `clone` is the only way to get a copy to change.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    code: String,
    bars: Vec<OhlcvBar>,
    indicators: HashMap<IndicatorType, IndicatorSeries>,
    date_index: HashMap<NaiveDate, usize>,
}

impl IndicatorFrame {
    pub fn new(
        code: String,
        bars: Vec<OhlcvBar>,
        indicators: HashMap<IndicatorType, IndicatorSeries>,
    ) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            code,
            bars,
            indicators,
            date_index,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn last_bar(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }

    pub fn indicator(&self, indicator_type: &IndicatorType) -> Option<&IndicatorSeries> {
        self.indicators.get(indicator_type)
    }

    /// Value on the last row, `None` if missing or invalid.
    pub fn last_value(&self, indicator_type: &IndicatorType) -> Option<&IndicatorValue> {
        self.indicator(indicator_type)
            .and_then(|s| s.last_valid())
            .map(|p| &p.value)
    }

    /// Scalar value on the last row, `None` if missing, invalid, or NaN.
    pub fn last_simple(&self, indicator_type: &IndicatorType) -> Option<f64> {
        self.last_value(indicator_type)
            .and_then(IndicatorValue::as_simple)
            .filter(|v| !v.is_nan())
    }
}

/// Split a multi-code bar list into per-code series, each ascending by date
/// with one bar per date (later entries win).
pub fn group_by_code(bars: &[OhlcvBar]) -> BTreeMap<String, Vec<OhlcvBar>> {
    let mut grouped: BTreeMap<String, BTreeMap<NaiveDate, OhlcvBar>> = BTreeMap::new();
    for bar in bars {
        grouped
            .entry(bar.code.clone())
            .or_default()
            .insert(bar.date, bar.clone());
    }
    grouped
        .into_iter()
        .map(|(code, by_date)| (code, by_date.into_values().collect()))
        .collect()
}
