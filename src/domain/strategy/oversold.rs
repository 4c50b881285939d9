//! Oversold-reversion screen.
//!
//! Matches a code when, on its last bar:
//! - KDJ J <= `j_threshold`
//! - volume is below `vol_shrink_ratio` of the rolling `vol_period` maximum
//! - close sits at most `ma_tolerance` above the first MA (in `ma_windows`
//!   order) that it is strictly above

use crate::domain::error::ScreenerError;
use crate::domain::frame::IndicatorFrame;
use crate::domain::indicator::{IndicatorType, IndicatorValue};
use crate::domain::strategy::params::{invalid, StrategyParams};
use crate::domain::strategy::{Evaluation, ResultRow, ResultShape, Strategy};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct OversoldReversionParams {
    pub kdj_period: usize,
    pub vol_period: usize,
    pub j_threshold: f64,
    pub vol_shrink_ratio: f64,
    pub ma_tolerance: f64,
    pub ma_windows: Vec<usize>,
}

impl Default for OversoldReversionParams {
    fn default() -> Self {
        Self {
            kdj_period: 9,
            vol_period: 20,
            j_threshold: 5.0,
            vol_shrink_ratio: 0.5,
            ma_tolerance: 0.03,
            ma_windows: vec![20, 30, 60],
        }
    }
}

impl OversoldReversionParams {
    pub const KEYS: &'static [&'static str] = &[
        "kdj_period",
        "vol_period",
        "j_threshold",
        "vol_shrink_ratio",
        "ma_tolerance",
        "ma_windows",
    ];

    pub fn from_params(section: &str, params: &StrategyParams) -> Result<Self, ScreenerError> {
        let d = Self::default();
        let p = Self {
            kdj_period: params.usize_or(section, "kdj_period", d.kdj_period)?,
            vol_period: params.usize_or(section, "vol_period", d.vol_period)?,
            j_threshold: params.f64_or(section, "j_threshold", d.j_threshold)?,
            vol_shrink_ratio: params.f64_or(section, "vol_shrink_ratio", d.vol_shrink_ratio)?,
            ma_tolerance: params.f64_or(section, "ma_tolerance", d.ma_tolerance)?,
            ma_windows: params.usize_list_or(section, "ma_windows", &d.ma_windows)?,
        };

        if p.kdj_period == 0 {
            return Err(invalid(section, "kdj_period", "must be positive"));
        }
        if p.vol_period == 0 {
            return Err(invalid(section, "vol_period", "must be positive"));
        }
        if p.ma_windows.is_empty() || p.ma_windows.contains(&0) {
            return Err(invalid(section, "ma_windows", "must list positive windows"));
        }
        if p.ma_tolerance < 0.0 {
            return Err(invalid(section, "ma_tolerance", "must be non-negative"));
        }
        if p.vol_shrink_ratio <= 0.0 {
            return Err(invalid(section, "vol_shrink_ratio", "must be positive"));
        }
        Ok(p)
    }
}

pub struct OversoldReversionStrategy {
    name: String,
    params: OversoldReversionParams,
}

impl OversoldReversionStrategy {
    pub fn new(name: &str, params: OversoldReversionParams) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }

    fn kdj_type(&self) -> IndicatorType {
        IndicatorType::Kdj {
            period: self.params.kdj_period,
        }
    }

    fn vol_max_type(&self) -> IndicatorType {
        IndicatorType::VolumeMax(self.params.vol_period)
    }
}

impl Strategy for OversoldReversionStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn result_shape(&self) -> ResultShape {
        ResultShape::Table
    }

    fn min_history(&self) -> usize {
        let longest_ma = self.params.ma_windows.iter().copied().max().unwrap_or(0);
        longest_ma
            .max(self.params.vol_period)
            .max(self.params.kdj_period)
    }

    fn indicator_types(&self, _code: &str) -> Vec<IndicatorType> {
        let mut types = vec![self.kdj_type(), self.vol_max_type()];
        types.extend(self.params.ma_windows.iter().map(|&w| IndicatorType::Ma(w)));
        types
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Evaluation {
        let Some(bar) = frame.last_bar() else {
            return Evaluation::Insufficient;
        };
        let Some(&IndicatorValue::Kdj { j, .. }) = frame.last_value(&self.kdj_type()) else {
            return Evaluation::Insufficient;
        };
        let Some(vol_max) = frame.last_simple(&self.vol_max_type()) else {
            return Evaluation::Insufficient;
        };
        let mut mas = Vec::with_capacity(self.params.ma_windows.len());
        for &w in &self.params.ma_windows {
            match frame.last_simple(&IndicatorType::Ma(w)) {
                Some(ma) => mas.push((w, ma)),
                None => return Evaluation::Insufficient,
            }
        }
        if j.is_nan() || bar.volume.is_nan() {
            return Evaluation::Insufficient;
        }

        let vol_ratio = if vol_max > 0.0 {
            bar.volume / vol_max
        } else {
            1.0
        };

        let oversold = j <= self.params.j_threshold;
        let shrinking = vol_ratio < self.params.vol_shrink_ratio;
        // only the highest-priority MA the close is above is considered
        let near_ma = mas.iter().find(|(_, ma)| bar.close > *ma).filter(|(_, ma)| {
            *ma > 0.0 && {
                let deviation = (bar.close - ma) / ma;
                (0.0..=self.params.ma_tolerance).contains(&deviation)
            }
        });

        if !(oversold && shrinking) {
            return Evaluation::NotMatched;
        }
        let Some(&(window, ma)) = near_ma else {
            return Evaluation::NotMatched;
        };

        let mut metrics = BTreeMap::from([
            ("close".to_string(), bar.close),
            ("kdj_j".to_string(), j),
            ("vol_ratio".to_string(), vol_ratio),
        ]);
        for (w, v) in &mas {
            metrics.insert(format!("ma{w}"), *v);
        }

        Evaluation::Matched(ResultRow {
            code: frame.code().to_string(),
            date: bar.date,
            metrics,
            note: Some(format!("near MA{window} ({ma:.2})")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::strategy::ScreeningResult;
    use chrono::NaiveDate;

    fn bar(i: usize, close: f64, volume: f64) -> OhlcvBar {
        OhlcvBar {
            code: "000001.SZ".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
            open: close,
            high: close + 0.2,
            low: close - 0.2,
            close,
            volume,
            amount: close * volume,
        }
    }

    /// A flat base at 10 with a small dip, ending about 1% above MA20 on a
    /// quiet day (volume a quarter of the 20-day max).
    fn pullback_series() -> Vec<OhlcvBar> {
        let mut bars: Vec<OhlcvBar> = (0..60).map(|i| bar(i, 10.0, 1000.0)).collect();
        let tail = [9.9, 9.95, 10.0, 10.1];
        for (k, &c) in tail.iter().enumerate() {
            bars.push(bar(60 + k, c, if k == tail.len() - 1 { 250.0 } else { 1000.0 }));
        }
        bars
    }

    // J on the pullback series is about 66, so the threshold is relaxed here
    fn strategy() -> OversoldReversionStrategy {
        OversoldReversionStrategy::new(
            "oversold",
            OversoldReversionParams {
                j_threshold: 100.0,
                ..OversoldReversionParams::default()
            },
        )
    }

    #[test]
    fn strict_j_threshold_rejects_pullback() {
        let s = OversoldReversionStrategy::new("o", OversoldReversionParams::default());
        assert!(s.run(&pullback_series()).result.is_empty());
    }

    #[test]
    fn min_history_is_longest_window() {
        assert_eq!(
            OversoldReversionStrategy::new("o", OversoldReversionParams::default()).min_history(),
            60
        );
    }

    #[test]
    fn short_history_is_insufficient() {
        let bars: Vec<OhlcvBar> = (0..5).map(|i| bar(i, 10.0, 100.0)).collect();
        let outcome = strategy().run(&bars);
        assert!(outcome.result.is_empty());
        assert_eq!(outcome.insufficient, vec!["000001.SZ".to_string()]);
    }

    #[test]
    fn matches_quiet_pullback_to_ma() {
        let bars = pullback_series();
        let outcome = strategy().run(&bars);
        assert!(outcome.insufficient.is_empty());
        let ScreeningResult::Table(rows) = outcome.result else {
            panic!("expected table result");
        };
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.code, "000001.SZ");
        assert!((row.metrics["vol_ratio"] - 0.25).abs() < 1e-12);
        assert!(row.note.as_deref().unwrap().starts_with("near MA20"));
    }

    #[test]
    fn loud_volume_is_rejected() {
        let mut bars = pullback_series();
        if let Some(last) = bars.last_mut() {
            last.volume = 900.0;
        }
        assert!(strategy().run(&bars).result.is_empty());
    }

    #[test]
    fn high_j_is_rejected() {
        let s = OversoldReversionStrategy::new("o", OversoldReversionParams::default());
        // a steadily rising series keeps J high
        let bars: Vec<OhlcvBar> = (0..70).map(|i| bar(i, 10.0 + i as f64 * 0.01, 100.0)).collect();
        let outcome = s.run(&bars);
        assert!(outcome.result.is_empty());
        assert!(outcome.insufficient.is_empty());
    }

    #[test]
    fn too_far_above_ma_is_rejected() {
        let s = OversoldReversionStrategy::new(
            "o",
            OversoldReversionParams {
                j_threshold: 1000.0,
                ma_tolerance: 0.001,
                ..OversoldReversionParams::default()
            },
        );
        assert!(s.run(&pullback_series()).result.is_empty());
    }

    #[test]
    fn zero_windows_rejected() {
        let params = StrategyParams::new().with(
            "ma_windows",
            crate::domain::strategy::params::ParamValue::List(vec![
                crate::domain::strategy::params::ParamValue::Int(0),
            ]),
        );
        assert!(OversoldReversionParams::from_params("o", &params).is_err());
    }
}
