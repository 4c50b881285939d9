//! BBI (Bull and Bear Index).
//!
//! BBI = (MA(a) + MA(b) + MA(c) + MA(d)) / 4, defaults 3, 6, 12, 24.
//! Invalid until the longest MA is valid.

use crate::domain::indicator::ma::rolling_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const DEFAULT_PERIODS: [usize; 4] = [3, 6, 12, 24];

pub fn calculate_bbi(bars: &[OhlcvBar], periods: [usize; 4]) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mas: Vec<Vec<Option<f64>>> = periods.iter().map(|&p| rolling_mean(&closes, p)).collect();

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let sum: Option<f64> = mas.iter().map(|ma| ma[i]).sum();
            IndicatorPoint {
                date: bar.date,
                valid: sum.is_some(),
                value: IndicatorValue::Simple(sum.map_or(f64::NAN, |s| s / 4.0)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bbi { periods },
        values,
    }
}
