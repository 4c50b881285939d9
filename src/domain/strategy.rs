//! Strategy contract and screening result types.
//!
//! A strategy turns a bar list into per-code indicator frames and then
//! evaluates the last row of each frame. `run` is the only entry point the
//! batch worker uses.

pub mod momentum;
pub mod oversold;
pub mod params;

use crate::domain::frame::{group_by_code, IndicatorFrame};
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator_helpers::compute_indicators;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// One matched symbol with the metrics that justified the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub code: String,
    pub date: NaiveDate,
    pub metrics: BTreeMap<String, f64>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Symbols,
    Table,
}

impl ResultShape {
    pub fn empty(self) -> ScreeningResult {
        match self {
            ResultShape::Symbols => ScreeningResult::Symbols(Vec::new()),
            ResultShape::Table => ScreeningResult::Table(Vec::new()),
        }
    }
}

/// Output of a strategy: either a bare symbol list or rows with metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum ScreeningResult {
    Symbols(Vec<String>),
    Table(Vec<ResultRow>),
}

impl ScreeningResult {
    pub fn shape(&self) -> ResultShape {
        match self {
            ScreeningResult::Symbols(_) => ResultShape::Symbols,
            ScreeningResult::Table(_) => ResultShape::Table,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ScreeningResult::Symbols(codes) => codes.len(),
            ScreeningResult::Table(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Codes present in the result, in result order.
    pub fn codes(&self) -> Vec<&str> {
        match self {
            ScreeningResult::Symbols(codes) => codes.iter().map(String::as_str).collect(),
            ScreeningResult::Table(rows) => rows.iter().map(|r| r.code.as_str()).collect(),
        }
    }

    /// Narrow a strategy's output to what it says about one symbol.
    ///
    /// A list result becomes `[code]` when it contains the code and `None`
    /// otherwise; a table result is kept when non-empty.
    pub fn for_symbol(self, code: &str) -> Option<ScreeningResult> {
        match self {
            ScreeningResult::Symbols(codes) => codes
                .iter()
                .any(|c| c == code)
                .then(|| ScreeningResult::Symbols(vec![code.to_string()])),
            ScreeningResult::Table(rows) if rows.is_empty() => None,
            table => Some(table),
        }
    }

    /// Merge another partial result of the same strategy.
    ///
    /// Lists are unioned, tables concatenated. A shape mismatch keeps
    /// `self` and drops `other`.
    pub fn merge(self, other: ScreeningResult) -> ScreeningResult {
        match (self, other) {
            (ScreeningResult::Symbols(mut a), ScreeningResult::Symbols(b)) => {
                let mut seen: HashSet<String> = a.iter().cloned().collect();
                for code in b {
                    if seen.insert(code.clone()) {
                        a.push(code);
                    }
                }
                ScreeningResult::Symbols(a)
            }
            (ScreeningResult::Table(mut a), ScreeningResult::Table(b)) => {
                a.extend(b);
                ScreeningResult::Table(a)
            }
            (kept, dropped) => {
                tracing::warn!(
                    kept = ?kept.shape(),
                    dropped = ?dropped.shape(),
                    "cannot merge results of different shapes"
                );
                kept
            }
        }
    }
}

/// Verdict on a single frame's last row.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Matched(ResultRow),
    NotMatched,
    /// A required indicator is null on the last row.
    Insufficient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub result: ScreeningResult,
    /// Codes whose history was too short or whose last-row indicators were null.
    pub insufficient: Vec<String>,
}

pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn result_shape(&self) -> ResultShape;

    /// Bars a code needs before the strategy will evaluate it.
    fn min_history(&self) -> usize;

    fn indicator_types(&self, code: &str) -> Vec<IndicatorType>;

    fn evaluate(&self, frame: &IndicatorFrame) -> Evaluation;

    /// Group bars by code and compute this strategy's indicators per code.
    fn compute_indicators(&self, bars: &[OhlcvBar]) -> Vec<IndicatorFrame> {
        group_by_code(bars)
            .into_iter()
            .map(|(code, series)| {
                let indicators = compute_indicators(&series, &self.indicator_types(&code));
                IndicatorFrame::new(code, series, indicators)
            })
            .collect()
    }

    /// Evaluate the last row of each frame.
    fn filter(&self, frames: &[IndicatorFrame]) -> FilterOutcome {
        let mut matched = Vec::new();
        let mut insufficient = Vec::new();

        for frame in frames {
            if frame.bar_count() < self.min_history() {
                insufficient.push(frame.code().to_string());
                continue;
            }
            match self.evaluate(frame) {
                Evaluation::Matched(row) => matched.push(row),
                Evaluation::NotMatched => {}
                Evaluation::Insufficient => insufficient.push(frame.code().to_string()),
            }
        }

        let result = match self.result_shape() {
            ResultShape::Symbols => {
                ScreeningResult::Symbols(matched.into_iter().map(|r| r.code).collect())
            }
            ResultShape::Table => ScreeningResult::Table(matched),
        };
        FilterOutcome {
            result,
            insufficient,
        }
    }

    fn run(&self, bars: &[OhlcvBar]) -> FilterOutcome {
        self.filter(&self.compute_indicators(bars))
    }
}
