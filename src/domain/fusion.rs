//! Reconciles a code's historical daily bars with same-day intraday ticks.
//!
//! Precedence for the trade date: a stored daily bar wins over the intraday
//! aggregate. Rows after the trade date never leak into the result.

use crate::domain::aggregator::aggregate_to_daily;
use crate::domain::error::ScreenerError;
use crate::domain::ohlcv::{HistoricalBar, OhlcvBar};
use crate::domain::tick::IntradayTick;
use crate::domain::trade_date::compact;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

/// Where the trade-date bar of a resolved series came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDateSource {
    History,
    Intraday,
    Missing,
}

#[derive(Debug, Clone)]
pub struct ResolvedSeries {
    pub bars: Vec<OhlcvBar>,
    pub source: TradeDateSource,
}

/// Resolve one code's canonical series up to and including `trade_date`.
///
/// Fails with `DataUnavailable` only when there is neither history nor an
/// intraday aggregate; a series without a trade-date bar is returned with
/// `TradeDateSource::Missing` and left to the caller to judge.
pub fn resolve(
    code: &str,
    history: &[HistoricalBar],
    ticks: &[IntradayTick],
    trade_date: NaiveDate,
) -> Result<ResolvedSeries, ScreenerError> {
    let mut by_date: BTreeMap<NaiveDate, OhlcvBar> = history
        .iter()
        .filter(|h| h.code == code && h.date <= trade_date)
        .map(|h| (h.date, h.to_canonical()))
        .collect();

    let source = if by_date.contains_key(&trade_date) {
        debug!(code, "trade date present in history, intraday aggregate ignored");
        TradeDateSource::History
    } else {
        let same_day: Vec<IntradayTick> = ticks
            .iter()
            .filter(|t| t.code == code && t.date == trade_date)
            .cloned()
            .collect();
        match aggregate_to_daily(&same_day).into_iter().next() {
            Some(bar) => {
                by_date.insert(trade_date, bar);
                TradeDateSource::Intraday
            }
            None => TradeDateSource::Missing,
        }
    };

    if by_date.is_empty() {
        return Err(ScreenerError::DataUnavailable {
            code: code.to_string(),
            date: compact(trade_date),
        });
    }

    Ok(ResolvedSeries {
        bars: by_date.into_values().collect(),
        source,
    })
}
