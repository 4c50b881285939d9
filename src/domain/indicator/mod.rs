//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values, aligned 1:1 with bars
//!
//! Every calculator is a pure function of a single code's ascending bar slice.
//! Points before an indicator's warmup is complete carry `valid == false`.

pub mod bbi;
pub mod bollinger;
pub mod ema;
pub mod kdj;
pub mod ma;
pub mod macd;
pub mod roc;
pub mod rsi;
pub mod stddev;
pub mod streak;

pub use bbi::calculate_bbi;
pub use bollinger::calculate_bollinger;
pub use ema::exponential_smooth;
pub use kdj::calculate_kdj;
pub use ma::calculate_ma;
pub use macd::calculate_macd;
pub use roc::calculate_roc;
pub use rsi::calculate_rsi;
pub use streak::{calculate_limit_up_count, calculate_up_streak};

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        dif: f64,
        dea: f64,
        histogram: f64,
    },
    Kdj {
        k: f64,
        d: f64,
        j: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

impl IndicatorValue {
    pub fn as_simple(&self) -> Option<f64> {
        match self {
            IndicatorValue::Simple(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorType {
    Ma(usize),
    Kdj {
        period: usize,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Rsi(usize),
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Bbi {
        periods: [usize; 4],
    },
    Roc(usize),
    VolumeMax(usize),
    PriorHigh(usize),
    UpStreak {
        limit_pct_x10: u32,
    },
    LimitUpCount {
        window: usize,
        limit_pct_x10: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Series with every point invalid, one per bar.
    pub fn all_invalid(indicator_type: IndicatorType, dates: impl Iterator<Item = NaiveDate>) -> Self {
        Self {
            indicator_type,
            values: dates
                .map(|date| IndicatorPoint {
                    date,
                    valid: false,
                    value: IndicatorValue::Simple(f64::NAN),
                })
                .collect(),
        }
    }

    /// Last point, if it is valid.
    pub fn last_valid(&self) -> Option<&IndicatorPoint> {
        self.values.last().filter(|p| p.valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ma(period) => write!(f, "MA({})", period),
            IndicatorType::Kdj { period } => write!(f, "KDJ({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLL({},{})", period, mult)
            }
            IndicatorType::Bbi { periods } => {
                write!(f, "BBI({},{},{},{})", periods[0], periods[1], periods[2], periods[3])
            }
            IndicatorType::Roc(period) => write!(f, "ROC({})", period),
            IndicatorType::VolumeMax(period) => write!(f, "VOL_MAX({})", period),
            IndicatorType::PriorHigh(period) => write!(f, "PRIOR_HIGH({})", period),
            IndicatorType::UpStreak { limit_pct_x10 } => {
                write!(f, "UP_STREAK({})", *limit_pct_x10 as f64 / 10.0)
            }
            IndicatorType::LimitUpCount {
                window,
                limit_pct_x10,
            } => write!(
                f,
                "LIMIT_UP_COUNT({},{})",
                window,
                *limit_pct_x10 as f64 / 10.0
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display_ma() {
        assert_eq!(IndicatorType::Ma(20).to_string(), "MA(20)");
    }

    #[test]
    fn indicator_type_display_macd() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLL(20,2)");
    }

    #[test]
    fn indicator_type_display_limit_up() {
        let t = IndicatorType::LimitUpCount {
            window: 250,
            limit_pct_x10: 200,
        };
        assert_eq!(t.to_string(), "LIMIT_UP_COUNT(250,20)");
    }

    #[test]
    fn indicator_type_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        let ma20 = IndicatorType::Ma(20);
        let ma60 = IndicatorType::Ma(60);
        let kdj = IndicatorType::Kdj { period: 9 };

        map.insert(ma20.clone(), "ma20_series".to_string());
        map.insert(ma60.clone(), "ma60_series".to_string());
        map.insert(kdj.clone(), "kdj_series".to_string());

        assert_eq!(map.get(&ma20), Some(&"ma20_series".to_string()));
        assert_eq!(map.get(&ma60), Some(&"ma60_series".to_string()));
        assert_eq!(
            map.get(&IndicatorType::Kdj { period: 9 }),
            Some(&"kdj_series".to_string())
        );
    }

    #[test]
    fn last_valid_skips_invalid_tail() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = IndicatorSeries::all_invalid(IndicatorType::Ma(5), std::iter::once(date));
        assert!(series.last_valid().is_none());
    }
}
