//! KDJ stochastic oscillator.
//!
//! RSV[i] = (C[i] - min(L, n)) / (max(H, n) - min(L, n)) * 100, 50 when the
//! range is zero or the window is not yet full.
//! K[0] = D[0] = 50, K[i] = 2/3*K[i-1] + 1/3*RSV[i], D[i] = 2/3*D[i-1] + 1/3*K[i].
//! A NaN predecessor or input resets the value to 50.
//! J = 3K - 2D, not clamped to [0, 100].
//!
//! Warmup: first (n-1) bars are invalid; a series shorter than n is entirely invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::{rolling_max, rolling_min};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIOD: usize = 9;

const NEUTRAL: f64 = 50.0;

pub fn calculate_kdj(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Kdj { period };
    if period == 0 || bars.len() < period {
        return IndicatorSeries::all_invalid(indicator_type, bars.iter().map(|b| b.date));
    }

    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let high_max = rolling_max(&highs, period);
    let low_min = rolling_min(&lows, period);

    let rsv: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match (low_min[i], high_max[i]) {
            (Some(lo), Some(hi)) if hi - lo != 0.0 => {
                let v = (bar.close - lo) / (hi - lo) * 100.0;
                if v.is_nan() { NEUTRAL } else { v }
            }
            _ => NEUTRAL,
        })
        .collect();

    let k = smooth(&rsv);
    let d = smooth(&k);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorPoint {
            date: bar.date,
            valid: i + 1 >= period,
            value: IndicatorValue::Kdj {
                k: k[i],
                d: d[i],
                j: 3.0 * k[i] - 2.0 * d[i],
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

fn smooth(input: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(input.len());
    for (i, &x) in input.iter().enumerate() {
        let v = if i == 0 {
            NEUTRAL
        } else {
            let prev = out[i - 1];
            if f64::is_nan(prev) || x.is_nan() {
                NEUTRAL
            } else {
                2.0 / 3.0 * prev + 1.0 / 3.0 * x
            }
        };
        out.push(v);
    }
    out
}
