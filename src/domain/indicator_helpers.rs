//! Shared helper functions for indicator calculations.

use crate::domain::indicator::{
    calculate_bbi, calculate_bollinger, calculate_kdj, calculate_limit_up_count, calculate_ma,
    calculate_macd, calculate_roc, calculate_rsi, calculate_up_streak, IndicatorPoint,
    IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::OhlcvBar;
use std::collections::HashMap;

/// Compute each requested indicator once over a single code's bars.
pub fn compute_indicators(
    bars: &[OhlcvBar],
    types: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorSeries> {
    let mut out = HashMap::with_capacity(types.len());
    for t in types {
        if out.contains_key(t) {
            continue;
        }
        out.insert(t.clone(), calculate(bars, t));
    }
    out
}

pub fn calculate(bars: &[OhlcvBar], indicator_type: &IndicatorType) -> IndicatorSeries {
    match *indicator_type {
        IndicatorType::Ma(period) => calculate_ma(bars, period),
        IndicatorType::Kdj { period } => calculate_kdj(bars, period),
        IndicatorType::Macd { fast, slow, signal } => calculate_macd(bars, fast, slow, signal),
        IndicatorType::Rsi(period) => calculate_rsi(bars, period),
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => calculate_bollinger(bars, period, stddev_mult_x100),
        IndicatorType::Bbi { periods } => calculate_bbi(bars, periods),
        IndicatorType::Roc(period) => calculate_roc(bars, period),
        IndicatorType::VolumeMax(period) => calc_volume_max(bars, period),
        IndicatorType::PriorHigh(period) => calc_prior_high(bars, period),
        IndicatorType::UpStreak { limit_pct_x10 } => calculate_up_streak(bars, limit_pct_x10),
        IndicatorType::LimitUpCount {
            window,
            limit_pct_x10,
        } => calculate_limit_up_count(bars, window, limit_pct_x10),
    }
}

/// Rolling maximum over full windows, `None` during warmup.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_fold(values, period, f64::max)
}

/// Rolling minimum over full windows, `None` during warmup.
pub fn rolling_min(values: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling_fold(values, period, f64::min)
}

fn rolling_fold(values: &[f64], period: usize, f: fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                None
            } else {
                values[i + 1 - period..=i].iter().copied().reduce(f)
            }
        })
        .collect()
}

/// Rolling maximum of volume over `period` bars.
pub fn calc_volume_max(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    IndicatorSeries {
        indicator_type: IndicatorType::VolumeMax(period),
        values: to_points(bars, rolling_max(&volumes, period)),
    }
}

/// Highest high of the `period` bars before each bar, excluding the bar
/// itself. Needs at least one prior bar.
pub fn calc_prior_high(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let highs = (0..bars.len())
        .map(|i| {
            if period == 0 || i == 0 {
                return None;
            }
            let start = i.saturating_sub(period);
            bars[start..i].iter().map(|b| b.high).reduce(f64::max)
        })
        .collect();
    IndicatorSeries {
        indicator_type: IndicatorType::PriorHigh(period),
        values: to_points(bars, highs),
    }
}

fn to_points(bars: &[OhlcvBar], values: Vec<Option<f64>>) -> Vec<IndicatorPoint> {
    bars.iter()
        .zip(values)
        .map(|(bar, v)| IndicatorPoint {
            date: bar.date,
            valid: v.is_some_and(|x| !x.is_nan()),
            value: IndicatorValue::Simple(v.unwrap_or(f64::NAN)),
        })
        .collect()
}
