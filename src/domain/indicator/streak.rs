//! Up-close streaks and limit-up counts.
//!
//! A day is limit-up when its close rose at least (limit - 0.1) percent over the
//! previous close. A day is an up day when close > previous close. Limit-up days
//! break an up streak.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

const LIMIT_TOLERANCE_PCT: f64 = 0.1;

/// Daily price limit in tenths of a percent for a code: 20% for ChiNext (300)
/// and STAR (688) boards, 10% elsewhere.
pub fn limit_pct_x10_for(code: &str) -> u32 {
    if code.starts_with("300") || code.starts_with("688") {
        200
    } else {
        100
    }
}

fn is_limit_up(bar: &OhlcvBar, prev_close: f64, limit_pct: f64) -> bool {
    if prev_close.is_nan() || prev_close <= 0.0 || bar.close.is_nan() || bar.close <= 0.0 {
        return false;
    }
    bar.pct_change(prev_close) >= limit_pct - LIMIT_TOLERANCE_PCT
}

fn is_up(bar: &OhlcvBar, prev_close: f64) -> bool {
    prev_close > 0.0 && bar.close > 0.0 && bar.close > prev_close
}

pub fn calculate_up_streak(bars: &[OhlcvBar], limit_pct_x10: u32) -> IndicatorSeries {
    let limit_pct = limit_pct_x10 as f64 / 10.0;
    let mut values = Vec::with_capacity(bars.len());
    let mut streak = 0usize;

    for (i, bar) in bars.iter().enumerate() {
        streak = match i.checked_sub(1).map(|p| bars[p].close) {
            Some(prev) if is_up(bar, prev) && !is_limit_up(bar, prev, limit_pct) => streak + 1,
            _ => 0,
        };
        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(streak as f64),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::UpStreak { limit_pct_x10 },
        values,
    }
}

/// Limit-up days among the trailing `window` bars, each compared with its
/// predecessor inside the window.
pub fn calculate_limit_up_count(
    bars: &[OhlcvBar],
    window: usize,
    limit_pct_x10: u32,
) -> IndicatorSeries {
    let limit_pct = limit_pct_x10 as f64 / 10.0;
    let flags: Vec<bool> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| i > 0 && is_limit_up(bar, bars[i - 1].close, limit_pct))
        .collect();

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let count = if window == 0 {
                0
            } else {
                let start = (i + 1).saturating_sub(window);
                flags[start + 1..i + 1].iter().filter(|f| **f).count()
            };
            IndicatorPoint {
                date: bar.date,
                valid: window > 0,
                value: IndicatorValue::Simple(count as f64),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::LimitUpCount {
            window,
            limit_pct_x10,
        },
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
                code: "600000.SH".into(),
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

    fn simple(series: &IndicatorSeries, i: usize) -> f64 {
        series.values[i].value.as_simple().unwrap()
    }

    #[test]
    fn limit_depends_on_board() {
        assert_eq!(limit_pct_x10_for("600000.SH"), 100);
        assert_eq!(limit_pct_x10_for("300750.SZ"), 200);
        assert_eq!(limit_pct_x10_for("688981.SH"), 200);
    }

    #[test]
    fn streak_counts_consecutive_up_closes() {
        let series = calculate_up_streak(&make_bars(&[10.0, 10.1, 10.2, 10.1, 10.2, 10.3]), 100);
        let streaks: Vec<f64> = (0..6).map(|i| simple(&series, i)).collect();
        assert_eq!(streaks, vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn limit_up_day_breaks_streak() {
        // 10.2 -> 11.22 is +10%
        let series = calculate_up_streak(&make_bars(&[10.0, 10.1, 10.2, 11.22, 11.3]), 100);
        assert_eq!(simple(&series, 3), 0.0);
        assert_eq!(simple(&series, 4), 1.0);
    }

    #[test]
    fn tolerance_counts_near_limit_moves() {
        // +9.95% counts against a 10% limit
        let bars = make_bars(&[10.0, 10.995]);
        let series = calculate_limit_up_count(&bars, 250, 100);
        assert_eq!(simple(&series, 1), 1.0);
    }

    #[test]
    fn limit_up_count_respects_window() {
        // limit-ups on index 1 and 4
        let bars = make_bars(&[10.0, 11.0, 11.0, 11.0, 12.1, 12.1]);
        let all = calculate_limit_up_count(&bars, 250, 100);
        assert_eq!(simple(&all, 5), 2.0);

        // window of 4 at index 5 spans indices 2..=5, comparisons for 3..=5
        let recent = calculate_limit_up_count(&bars, 4, 100);
        assert_eq!(simple(&recent, 5), 1.0);
    }

    #[test]
    fn wider_limit_ignores_ten_percent_moves() {
        let bars = make_bars(&[10.0, 11.0]);
        let series = calculate_limit_up_count(&bars, 250, 200);
        assert_eq!(simple(&series, 1), 0.0);
    }
}
