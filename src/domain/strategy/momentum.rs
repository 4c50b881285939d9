//! Multi-day momentum screen.
//!
//! Picks main-board codes on a run of ordinary up days that are breaking a
//! short-term high without having run too far, and that have shown limit-up
//! strength within the last year. Produces a bare symbol list.

use crate::domain::error::ScreenerError;
use crate::domain::frame::IndicatorFrame;
use crate::domain::indicator::streak::limit_pct_x10_for;
use crate::domain::indicator::IndicatorType;
use crate::domain::strategy::params::{invalid, StrategyParams};
use crate::domain::strategy::{Evaluation, ResultRow, ResultShape, Strategy};
use std::collections::BTreeMap;

const ROC_PERIOD: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    pub min_consecutive_days: usize,
    pub max_price: f64,
    pub max_5day_pct: f64,
    pub min_limit_up_count: usize,
    pub limit_up_window: usize,
    pub new_high_window: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            min_consecutive_days: 5,
            max_price: 25.0,
            max_5day_pct: 10.0,
            min_limit_up_count: 2,
            limit_up_window: 250,
            new_high_window: 10,
        }
    }
}

impl MomentumParams {
    pub const KEYS: &'static [&'static str] = &[
        "min_consecutive_days",
        "max_price",
        "max_5day_pct",
        "min_limit_up_count",
        "limit_up_window",
        "new_high_window",
    ];

    pub fn from_params(section: &str, params: &StrategyParams) -> Result<Self, ScreenerError> {
        let d = Self::default();
        let p = Self {
            min_consecutive_days: params.usize_or(
                section,
                "min_consecutive_days",
                d.min_consecutive_days,
            )?,
            max_price: params.f64_or(section, "max_price", d.max_price)?,
            max_5day_pct: params.f64_or(section, "max_5day_pct", d.max_5day_pct)?,
            min_limit_up_count: params.usize_or(section, "min_limit_up_count", d.min_limit_up_count)?,
            limit_up_window: params.usize_or(section, "limit_up_window", d.limit_up_window)?,
            new_high_window: params.usize_or(section, "new_high_window", d.new_high_window)?,
        };
        if p.new_high_window == 0 {
            return Err(invalid(section, "new_high_window", "must be positive"));
        }
        if p.limit_up_window == 0 {
            return Err(invalid(section, "limit_up_window", "must be positive"));
        }
        if p.max_price <= 0.0 {
            return Err(invalid(section, "max_price", "must be positive"));
        }
        Ok(p)
    }
}

/// Beijing exchange, ChiNext and STAR board codes are never screened.
pub fn is_excluded_board(code: &str) -> bool {
    code.ends_with(".BJ") || code.starts_with("300") || code.starts_with("688")
}

pub struct MomentumStrategy {
    name: String,
    params: MomentumParams,
}

impl MomentumStrategy {
    pub fn new(name: &str, params: MomentumParams) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }

    fn streak_type(code: &str) -> IndicatorType {
        IndicatorType::UpStreak {
            limit_pct_x10: limit_pct_x10_for(code),
        }
    }

    fn limit_count_type(&self, code: &str) -> IndicatorType {
        IndicatorType::LimitUpCount {
            window: self.params.limit_up_window,
            limit_pct_x10: limit_pct_x10_for(code),
        }
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn result_shape(&self) -> ResultShape {
        ResultShape::Symbols
    }

    fn min_history(&self) -> usize {
        self.params.min_consecutive_days + self.params.new_high_window
    }

    fn indicator_types(&self, code: &str) -> Vec<IndicatorType> {
        vec![
            Self::streak_type(code),
            self.limit_count_type(code),
            IndicatorType::Roc(ROC_PERIOD),
            IndicatorType::PriorHigh(self.params.new_high_window),
        ]
    }

    fn evaluate(&self, frame: &IndicatorFrame) -> Evaluation {
        let code = frame.code();
        if is_excluded_board(code) {
            return Evaluation::NotMatched;
        }
        let Some(bar) = frame.last_bar() else {
            return Evaluation::Insufficient;
        };
        let (Some(streak), Some(limit_ups), Some(prior_high)) = (
            frame.last_simple(&Self::streak_type(code)),
            frame.last_simple(&self.limit_count_type(code)),
            frame.last_simple(&IndicatorType::PriorHigh(self.params.new_high_window)),
        ) else {
            return Evaluation::Insufficient;
        };
        // a missing 5-day change fails the screen rather than skipping the code
        let Some(pct_5d) = frame.last_simple(&IndicatorType::Roc(ROC_PERIOD)) else {
            return Evaluation::NotMatched;
        };

        let matched = streak >= self.params.min_consecutive_days as f64
            && bar.close < self.params.max_price
            && pct_5d <= self.params.max_5day_pct
            && limit_ups >= self.params.min_limit_up_count as f64
            && bar.close >= prior_high;

        if !matched {
            return Evaluation::NotMatched;
        }

        Evaluation::Matched(ResultRow {
            code: code.to_string(),
            date: bar.date,
            metrics: BTreeMap::from([
                ("close".to_string(), bar.close),
                ("consecutive_up".to_string(), streak),
                ("pct_change_5d".to_string(), pct_5d),
                ("limit_up_count".to_string(), limit_ups),
            ]),
            note: None,
        })
    }
}
