//! Screening scheduler.
//!
//! Splits a symbol universe into batches, runs them on a dedicated rayon pool,
//! and folds the per-batch outcomes into one result and one set of counters.
//! `run_strategies` fans several strategies out on scoped threads and persists
//! each merged result.

use crate::domain::batch::{panic_message, run_batch, BatchOutcome, ScreeningContext, ScreeningCounters, SymbolOutcome};
use crate::domain::error::ScreenerError;
use crate::domain::retry::RetryPolicy;
use crate::domain::strategy::params::StrategySpec;
use crate::domain::strategy::ScreeningResult;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::notify_port::NotifyPort;
use crate::ports::result_port::ResultPort;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub workers: usize,
    /// Fixed batch size; `None` splits the universe evenly across workers.
    pub batch_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl SchedulerConfig {
    /// `[screening] workers` (0 or absent means available parallelism) and
    /// `[screening] batch_size` (0 or absent means even split).
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let workers = config.get_int("screening", "workers", 0);
        let batch_size = config.get_int("screening", "batch_size", 0);
        Self {
            workers: if workers > 0 {
                workers as usize
            } else {
                default_workers()
            },
            batch_size: (batch_size > 0).then_some(batch_size as usize),
        }
    }

    fn check(&self) -> Result<(), ScreenerError> {
        if self.workers == 0 {
            return Err(ScreenerError::ConfigInvalid {
                section: "screening".into(),
                key: "workers".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.batch_size == Some(0) {
            return Err(ScreenerError::ConfigInvalid {
                section: "screening".into(),
                key: "batch_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Split symbols into contiguous batches of `batch_size`, or of
/// ceil(N / workers) when no size is given.
pub fn partition(symbols: &[String], workers: usize, batch_size: Option<usize>) -> Vec<Vec<String>> {
    if symbols.is_empty() {
        return Vec::new();
    }
    let size = batch_size
        .unwrap_or_else(|| symbols.len().div_ceil(workers.max(1)))
        .max(1);
    symbols.chunks(size).map(<[String]>::to_vec).collect()
}

/// Merged outcome of one strategy over the whole universe.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningRun {
    pub strategy: String,
    pub trade_date: NaiveDate,
    pub result: ScreeningResult,
    pub outcomes: BTreeMap<String, SymbolOutcome>,
    pub counters: ScreeningCounters,
}

/// What a notifier is told about one strategy run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreeningSummary {
    pub strategy: String,
    pub trade_date: NaiveDate,
    pub matched: usize,
    pub counters: ScreeningCounters,
    pub persisted: bool,
    pub error: Option<String>,
}

impl ScreeningSummary {
    pub fn from_run(run: &ScreeningRun, persisted: bool, error: Option<String>) -> Self {
        Self {
            strategy: run.strategy.clone(),
            trade_date: run.trade_date,
            matched: run.result.len(),
            counters: run.counters,
            persisted,
            error,
        }
    }
}

impl fmt::Display for ScreeningSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counters;
        write!(
            f,
            "{} {}: {} matched of {} symbols ({} excluded, {} errored)",
            self.strategy,
            self.trade_date.format("%Y-%m-%d"),
            self.matched,
            c.total,
            c.excluded(),
            c.errored
        )?;
        match &self.error {
            Some(error) => write!(f, ", not persisted: {error}"),
            None if self.persisted => write!(f, ", persisted"),
            None => Ok(()),
        }
    }
}

/// Where merged results go and who hears about them.
pub struct Sinks<'a> {
    pub results: Vec<&'a dyn ResultPort>,
    pub notifier: Option<&'a dyn NotifyPort>,
    pub retry: RetryPolicy,
}

pub struct ScreeningScheduler<'a> {
    data_port: &'a dyn DataPort,
    config: SchedulerConfig,
}

impl<'a> ScreeningScheduler<'a> {
    pub fn new(data_port: &'a dyn DataPort, config: SchedulerConfig) -> Self {
        Self { data_port, config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Screen `symbols` with `spec`, blocking until every batch completes.
    ///
    /// Only argument errors are returned. Failures inside the pool become
    /// errored symbols in the returned run.
    pub fn screen(
        &self,
        spec: &StrategySpec,
        symbols: &[String],
        ctx: &ScreeningContext,
    ) -> Result<ScreeningRun, ScreenerError> {
        self.config.check()?;
        let shape = spec.result_shape();
        let batches = partition(symbols, self.config.workers, self.config.batch_size);
        info!(
            strategy = spec.name(),
            trade_date = %ctx.trade_date,
            symbols = symbols.len(),
            batches = batches.len(),
            workers = self.config.workers,
            "screening started"
        );

        let merged = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
        {
            Ok(pool) => {
                let data_port = self.data_port;
                let outcomes: Vec<BatchOutcome> = pool.install(|| {
                    batches
                        .par_iter()
                        .map(|batch| {
                            catch_unwind(AssertUnwindSafe(|| run_batch(data_port, spec, batch, ctx)))
                                .unwrap_or_else(|payload| {
                                    let msg = panic_message(payload.as_ref());
                                    error!(strategy = spec.name(), panic = %msg, "batch worker panicked");
                                    BatchOutcome::failed(shape, batch, &format!("worker panic: {msg}"))
                                })
                        })
                        .collect()
                });
                outcomes
                    .into_iter()
                    .fold(BatchOutcome::empty(shape), |mut acc, batch| {
                        acc.merge(batch);
                        acc
                    })
            }
            Err(e) => {
                error!(strategy = spec.name(), error = %e, "failed to build worker pool");
                BatchOutcome::failed(shape, symbols, &format!("worker pool: {e}"))
            }
        };

        let counters = merged.counters;
        info!(
            strategy = spec.name(),
            total = counters.total,
            filtered_in = counters.filtered_in,
            not_matched = counters.not_matched,
            no_data = counters.no_data,
            no_same_day_data = counters.no_same_day_data,
            insufficient_history = counters.insufficient_history,
            errored = counters.errored,
            "screening finished"
        );

        Ok(ScreeningRun {
            strategy: spec.name().to_string(),
            trade_date: ctx.trade_date,
            result: merged.result,
            outcomes: merged.outcomes,
            counters,
        })
    }

    /// Run each strategy on its own thread, then persist and notify.
    ///
    /// Returns one run and summary per spec, in `specs` order.
    pub fn run_strategies(
        &self,
        specs: &[StrategySpec],
        symbols: &[String],
        ctx: &ScreeningContext,
        sinks: &Sinks<'_>,
    ) -> Result<Vec<(ScreeningRun, ScreeningSummary)>, ScreenerError> {
        self.config.check()?;

        let reports = std::thread::scope(|s| {
            let handles: Vec<_> = specs
                .iter()
                .map(|spec| s.spawn(move || self.screen_and_publish(spec, symbols, ctx, sinks)))
                .collect();

            handles
                .into_iter()
                .zip(specs)
                .map(|(handle, spec)| match handle.join() {
                    Ok(Ok(report)) => report,
                    Ok(Err(e)) => failed_run(spec, symbols, ctx, &e.to_string()),
                    Err(payload) => {
                        let msg = panic_message(payload.as_ref());
                        error!(strategy = spec.name(), panic = %msg, "strategy thread panicked");
                        failed_run(spec, symbols, ctx, &format!("panic: {msg}"))
                    }
                })
                .collect()
        });
        Ok(reports)
    }

    fn screen_and_publish(
        &self,
        spec: &StrategySpec,
        symbols: &[String],
        ctx: &ScreeningContext,
        sinks: &Sinks<'_>,
    ) -> Result<(ScreeningRun, ScreeningSummary), ScreenerError> {
        let run = self.screen(spec, symbols, ctx)?;

        let mut failures = Vec::new();
        for sink in &sinks.results {
            let saved = sinks
                .retry
                .run("save result", || sink.save(&run.strategy, run.trade_date, &run.result));
            if let Err(e) = saved {
                error!(strategy = %run.strategy, error = %e, "failed to persist result");
                failures.push(e.to_string());
            }
        }

        let persisted = failures.is_empty() && !sinks.results.is_empty();
        let summary = ScreeningSummary::from_run(
            &run,
            persisted,
            (!failures.is_empty()).then(|| failures.join("; ")),
        );
        let c = &summary.counters;
        match &summary.error {
            None => info!(
                strategy = %summary.strategy,
                trade_date = %summary.trade_date,
                matched = summary.matched,
                total = c.total,
                excluded = c.excluded(),
                errored = c.errored,
                persisted = summary.persisted,
                "screening summary"
            ),
            Some(error) => warn!(
                strategy = %summary.strategy,
                trade_date = %summary.trade_date,
                matched = summary.matched,
                total = c.total,
                error = %error,
                "screening finished with errors"
            ),
        }
        if let Some(notifier) = sinks.notifier {
            if let Err(e) = notifier.notify(&summary.to_string()) {
                warn!(strategy = %run.strategy, error = %e, "notification failed");
            }
        }
        Ok((run, summary))
    }
}

fn failed_run(
    spec: &StrategySpec,
    symbols: &[String],
    ctx: &ScreeningContext,
    reason: &str,
) -> (ScreeningRun, ScreeningSummary) {
    let failed = BatchOutcome::failed(spec.result_shape(), symbols, reason);
    let run = ScreeningRun {
        strategy: spec.name().to_string(),
        trade_date: ctx.trade_date,
        result: failed.result,
        outcomes: failed.outcomes,
        counters: failed.counters,
    };
    let summary = ScreeningSummary::from_run(&run, false, Some(reason.to_string()));
    (run, summary)
}
