//! RSI (Relative Strength Index) indicator implementation.
//!
//! Uses a simple rolling mean of gains and losses over n rows:
//! - delta[i] = C[i] - C[i-1], delta[0] = 0
//! - avg_gain = mean(max(delta, 0)), avg_loss = mean(max(-delta, 0))
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! Zero loss is left to float semantics: all gains give 100, a flat
//! window gives NaN (0/0). Such points are still marked valid.
//!
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::ma::rolling_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut gains = Vec::with_capacity(bars.len());
    let mut losses = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let change = if i == 0 {
            0.0
        } else {
            bar.close - bars[i - 1].close
        };
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match (avg_gain[i], avg_loss[i]) {
            (Some(gain), Some(loss)) => IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::Simple(100.0 - 100.0 / (1.0 + gain / loss)),
            },
            _ => IndicatorPoint {
                date: bar.date,
                valid: false,
                value: IndicatorValue::Simple(f64::NAN),
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                code: "TEST".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
                amount: 0.0,
            })
            .collect()
    }

    fn rsi_at(series: &IndicatorSeries, i: usize) -> f64 {
        series.values[i].value.as_simple().unwrap()
    }

    #[test]
    fn rsi_warmup() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.0, 13.0]);
        let series = calculate_rsi(&bars, 3);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let series = calculate_rsi(&bars, 3);
        assert!((rsi_at(&series, 4) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let bars = make_bars(&[14.0, 13.0, 12.0, 11.0, 10.0]);
        let series = calculate_rsi(&bars, 3);
        assert!(rsi_at(&series, 4).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_constant_series_is_nan_without_panicking() {
        let bars = make_bars(&[10.0; 20]);
        let series = calculate_rsi(&bars, 14);
        assert!(series.values[19].valid);
        assert!(rsi_at(&series, 19).is_nan());
    }

    #[test]
    fn rsi_mixed_moves() {
        // deltas: 0, +2, -1 → avg_gain = 2/3, avg_loss = 1/3, RS = 2
        let bars = make_bars(&[10.0, 12.0, 11.0]);
        let series = calculate_rsi(&bars, 3);
        let expected = 100.0 - 100.0 / 3.0;
        assert!((rsi_at(&series, 2) - expected).abs() < 1e-9);
    }

    #[test]
    fn rsi_is_deterministic() {
        let prices: Vec<f64> = (0..30).map(|i| 10.0 + (i as f64).cos()).collect();
        let bars = make_bars(&prices);
        let a = calculate_rsi(&bars, 14);
        let b = calculate_rsi(&bars, 14);
        for (x, y) in a.values.iter().zip(&b.values) {
            let (x, y) = (x.value.as_simple().unwrap(), y.value.as_simple().unwrap());
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}
