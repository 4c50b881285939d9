//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! DIF = EMA(fast) - EMA(slow)
//! DEA = EMA(signal) of DIF
//! Histogram = 2 * (DIF - DEA)
//!
//! EMAs are seeded with the first value, so every point is valid.
//! Default parameters: fast=12, slow=26, signal=9

use crate::domain::indicator::{
    exponential_smooth, IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[OhlcvBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if fast == 0 || slow == 0 || signal_period == 0 {
        return IndicatorSeries::all_invalid(indicator_type, bars.iter().map(|b| b.date));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = exponential_smooth(&closes, fast);
    let ema_slow = exponential_smooth(&closes, slow);

    let dif: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let dea = exponential_smooth(&dif, signal_period);

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Macd {
                dif: dif[i],
                dea: dea[i],
                histogram: 2.0 * (dif[i] - dea[i]),
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
