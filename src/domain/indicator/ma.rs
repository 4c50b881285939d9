//! Simple moving average of close.
//!
//! MA(n)[i] = mean(C[i-n+1..=i]). Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_WINDOWS: [usize; 5] = [5, 10, 20, 30, 60];

pub fn calculate_ma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let means = rolling_mean(&closes, period);

    IndicatorSeries {
        indicator_type: IndicatorType::Ma(period),
        values: bars
            .iter()
            .zip(means)
            .map(|(bar, mean)| IndicatorPoint {
                date: bar.date,
                valid: mean.is_some(),
                value: IndicatorValue::Simple(mean.unwrap_or(f64::NAN)),
            })
            .collect(),
    }
}

/// Rolling mean, `None` until `period` values are available.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            // summed per window so the value does not depend on how much history precedes it
            (i + 1 >= period)
                .then(|| values[i + 1 - period..=i].iter().sum::<f64>() / period as f64)
        })
        .collect()
}
