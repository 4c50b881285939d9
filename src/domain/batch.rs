//! Batch worker: fusion, indicators and one strategy over a slice of symbols.
//!
//! Every symbol ends in exactly one outcome. Errors and panics raised while
//! screening a symbol are contained to that symbol.

use crate::domain::error::ScreenerError;
use crate::domain::fusion::{resolve, TradeDateSource};
use crate::domain::strategy::params::StrategySpec;
use crate::domain::strategy::{ResultShape, ScreeningResult, Strategy};
use crate::domain::trade_date::lookback_start;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Dates a screening run is anchored to. There is no implicit "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreeningContext {
    pub trade_date: NaiveDate,
    pub history_start: NaiveDate,
}

impl ScreeningContext {
    pub fn new(trade_date: NaiveDate, history_start: NaiveDate) -> Self {
        Self {
            trade_date,
            history_start,
        }
    }

    pub fn with_lookback(trade_date: NaiveDate, lookback_days: u32) -> Self {
        Self::new(trade_date, lookback_start(trade_date, lookback_days))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    NoData,
    NoSameDayData,
    InsufficientHistory,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    /// The strategy's verdict narrowed to this symbol.
    Matched(ScreeningResult),
    NotMatched,
    Excluded(ExclusionReason),
}

impl SymbolOutcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, SymbolOutcome::Excluded(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScreeningCounters {
    pub total: usize,
    pub no_data: usize,
    pub no_same_day_data: usize,
    pub insufficient_history: usize,
    pub filtered_in: usize,
    pub not_matched: usize,
    pub errored: usize,
}

impl ScreeningCounters {
    pub fn record(&mut self, outcome: &SymbolOutcome) {
        self.total += 1;
        match outcome {
            SymbolOutcome::Matched(_) => self.filtered_in += 1,
            SymbolOutcome::NotMatched => self.not_matched += 1,
            SymbolOutcome::Excluded(ExclusionReason::NoData) => self.no_data += 1,
            SymbolOutcome::Excluded(ExclusionReason::NoSameDayData) => self.no_same_day_data += 1,
            SymbolOutcome::Excluded(ExclusionReason::InsufficientHistory) => {
                self.insufficient_history += 1
            }
            SymbolOutcome::Excluded(ExclusionReason::Error(_)) => self.errored += 1,
        }
    }

    pub fn merge(&mut self, other: &ScreeningCounters) {
        self.total += other.total;
        self.no_data += other.no_data;
        self.no_same_day_data += other.no_same_day_data;
        self.insufficient_history += other.insufficient_history;
        self.filtered_in += other.filtered_in;
        self.not_matched += other.not_matched;
        self.errored += other.errored;
    }

    /// Counters for `count` symbols that all failed.
    pub fn all_errored(count: usize) -> Self {
        Self {
            total: count,
            errored: count,
            ..Self::default()
        }
    }

    pub fn excluded(&self) -> usize {
        self.no_data + self.no_same_day_data + self.insufficient_history + self.errored
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub result: ScreeningResult,
    pub outcomes: BTreeMap<String, SymbolOutcome>,
    pub counters: ScreeningCounters,
}

impl BatchOutcome {
    pub fn empty(shape: ResultShape) -> Self {
        Self {
            result: shape.empty(),
            outcomes: BTreeMap::new(),
            counters: ScreeningCounters::default(),
        }
    }

    /// Outcome for a batch that failed outside its per-symbol loop.
    pub fn failed(shape: ResultShape, symbols: &[String], reason: &str) -> Self {
        let outcomes: BTreeMap<String, SymbolOutcome> = symbols
            .iter()
            .map(|code| {
                (
                    code.clone(),
                    SymbolOutcome::Excluded(ExclusionReason::Error(reason.to_string())),
                )
            })
            .collect();
        Self {
            result: shape.empty(),
            counters: ScreeningCounters::all_errored(outcomes.len()),
            outcomes,
        }
    }

    pub fn push(&mut self, code: String, outcome: SymbolOutcome) {
        self.counters.record(&outcome);
        if let SymbolOutcome::Matched(partial) = &outcome {
            let result = std::mem::replace(&mut self.result, ScreeningResult::Symbols(Vec::new()));
            self.result = result.merge(partial.clone());
        }
        self.outcomes.insert(code, outcome);
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        let result = std::mem::replace(&mut self.result, ScreeningResult::Symbols(Vec::new()));
        self.result = result.merge(other.result);
        self.counters.merge(&other.counters);
        self.outcomes.extend(other.outcomes);
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Screen one batch of symbols with a single strategy instance built from
/// `spec`.
pub fn run_batch(
    data_port: &dyn DataPort,
    spec: &StrategySpec,
    symbols: &[String],
    ctx: &ScreeningContext,
) -> BatchOutcome {
    let strategy = match spec.build() {
        Ok(s) => s,
        Err(e) => {
            warn!(strategy = spec.name(), error = %e, "strategy construction failed in worker");
            return BatchOutcome::failed(spec.result_shape(), symbols, &e.to_string());
        }
    };

    let mut batch = BatchOutcome::empty(strategy.result_shape());
    for code in symbols {
        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            screen_symbol(data_port, strategy.as_ref(), code, ctx)
        })) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(code = %code, strategy = spec.name(), error = %e, "symbol screening failed");
                SymbolOutcome::Excluded(ExclusionReason::Error(e.to_string()))
            }
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                warn!(code = %code, strategy = spec.name(), panic = %msg, "symbol screening panicked");
                SymbolOutcome::Excluded(ExclusionReason::Error(format!("panic: {msg}")))
            }
        };
        debug!(code = %code, outcome = ?outcome, "symbol screened");
        batch.push(code.clone(), outcome);
    }

    info!(
        strategy = spec.name(),
        symbols = symbols.len(),
        matched = batch.counters.filtered_in,
        excluded = batch.counters.excluded(),
        "batch complete"
    );
    batch
}

fn screen_symbol(
    data_port: &dyn DataPort,
    strategy: &dyn Strategy,
    code: &str,
    ctx: &ScreeningContext,
) -> Result<SymbolOutcome, ScreenerError> {
    let history = data_port.fetch_history(code, ctx.history_start, ctx.trade_date)?;
    let ticks = if history.iter().any(|h| h.date == ctx.trade_date) {
        Vec::new()
    } else {
        data_port.fetch_ticks(code, ctx.trade_date)?
    };

    let resolved = match resolve(code, &history, &ticks, ctx.trade_date) {
        Ok(r) => r,
        Err(ScreenerError::DataUnavailable { .. }) => {
            return Ok(SymbolOutcome::Excluded(ExclusionReason::NoData));
        }
        Err(e) => return Err(e),
    };
    if resolved.source == TradeDateSource::Missing {
        return Ok(SymbolOutcome::Excluded(ExclusionReason::NoSameDayData));
    }
    if resolved.bars.len() < strategy.min_history() {
        debug!(
            code,
            bars = resolved.bars.len(),
            minimum = strategy.min_history(),
            "insufficient history"
        );
        return Ok(SymbolOutcome::Excluded(ExclusionReason::InsufficientHistory));
    }

    let outcome = strategy.run(&resolved.bars);
    if outcome.insufficient.iter().any(|c| c == code) {
        return Ok(SymbolOutcome::Excluded(ExclusionReason::InsufficientHistory));
    }
    Ok(match outcome.result.for_symbol(code) {
        Some(result) => SymbolOutcome::Matched(result),
        None => SymbolOutcome::NotMatched,
    })
}
