//! ROC (Rate of Change) indicator implementation.
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100
//! If C[i-n] == 0 the point is invalid.
//! Warmup: first n bars invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_roc(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev_close = (i >= period).then(|| bars[i - period].close);
            match prev_close {
                Some(prev) if prev != 0.0 => IndicatorPoint {
                    date: bar.date,
                    valid: true,
                    value: IndicatorValue::Simple(bar.pct_change(prev)),
                },
                _ => IndicatorPoint {
                    date: bar.date,
                    valid: false,
                    value: IndicatorValue::Simple(f64::NAN),
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}
