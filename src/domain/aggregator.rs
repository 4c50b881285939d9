//! Intraday tick to daily bar aggregation.
//!
//! Ticks are grouped by (code, date), ordered by time within each group and
//! collapsed into one OHLCV bar per group. Groups that cannot produce a
//! well-formed bar are dropped with a warning rather than failing the batch.

use crate::domain::error::ScreenerError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::tick::IntradayTick;
use crate::domain::trade_date::parse_date;
use chrono::{NaiveDate, NaiveTime};
use std::collections::BTreeMap;
use tracing::warn;

pub const REQUIRED_TICK_COLUMNS: [&str; 6] = ["code", "date", "time", "price", "volume", "amount"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationRule {
    First,
    Last,
    Max,
    Min,
    Sum,
    Mean,
}

impl AggregationRule {
    /// Unknown rule names fall back to `First`.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "first" => AggregationRule::First,
            "last" => AggregationRule::Last,
            "max" => AggregationRule::Max,
            "min" => AggregationRule::Min,
            "sum" => AggregationRule::Sum,
            "mean" => AggregationRule::Mean,
            other => {
                warn!(rule = other, "unknown aggregation rule, using first");
                AggregationRule::First
            }
        }
    }

    /// Apply to time-ordered values. `None` means the result is null.
    fn apply(self, values: &[Option<f64>]) -> Option<f64> {
        let present = || values.iter().filter_map(|v| *v).filter(|v| !v.is_nan());
        match self {
            AggregationRule::First => values.first().copied().flatten(),
            AggregationRule::Last => values.last().copied().flatten(),
            AggregationRule::Max => present().reduce(f64::max),
            AggregationRule::Min => present().reduce(f64::min),
            AggregationRule::Sum => Some(present().sum()),
            AggregationRule::Mean => {
                let (sum, n) = present().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n == 0 { None } else { Some(sum / n as f64) }
            }
        }
    }
}

/// Per-output-field aggregation rules. OHLC rules read the tick price,
/// volume and amount rules read their own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationRules {
    pub open: AggregationRule,
    pub high: AggregationRule,
    pub low: AggregationRule,
    pub close: AggregationRule,
    pub volume: AggregationRule,
    pub amount: AggregationRule,
}

impl Default for AggregationRules {
    fn default() -> Self {
        Self {
            open: AggregationRule::First,
            high: AggregationRule::Max,
            low: AggregationRule::Min,
            close: AggregationRule::Last,
            volume: AggregationRule::Sum,
            amount: AggregationRule::Sum,
        }
    }
}

impl AggregationRules {
    /// Overlay `(field, rule)` pairs on the defaults. Unknown fields are ignored.
    pub fn from_pairs<F: AsRef<str>, R: AsRef<str>>(pairs: &[(F, R)]) -> Self {
        let mut rules = Self::default();
        for (field, rule) in pairs {
            let rule = AggregationRule::parse(rule.as_ref());
            match field.as_ref().trim().to_lowercase().as_str() {
                "open" => rules.open = rule,
                "high" => rules.high = rule,
                "low" => rules.low = rule,
                "close" => rules.close = rule,
                "volume" | "vol" => rules.volume = rule,
                "amount" => rules.amount = rule,
                other => warn!(field = other, "unknown aggregation field ignored"),
            }
        }
        rules
    }
}

pub fn aggregate_to_daily(ticks: &[IntradayTick]) -> Vec<OhlcvBar> {
    aggregate_with_rules(ticks, &AggregationRules::default())
}

pub fn aggregate_with_rules(ticks: &[IntradayTick], rules: &AggregationRules) -> Vec<OhlcvBar> {
    let mut groups: BTreeMap<(&str, NaiveDate), Vec<&IntradayTick>> = BTreeMap::new();
    for tick in ticks {
        groups
            .entry((tick.code.as_str(), tick.date))
            .or_default()
            .push(tick);
    }

    let mut bars = Vec::with_capacity(groups.len());
    for ((code, date), mut group) in groups {
        group.sort_by_key(|t| t.time);

        let prices: Vec<Option<f64>> = group.iter().map(|t| t.price).collect();
        let volumes: Vec<Option<f64>> = group.iter().map(|t| t.volume).collect();
        let amounts: Vec<Option<f64>> = group.iter().map(|t| t.amount).collect();

        let ohlc = (
            rules.open.apply(&prices),
            rules.high.apply(&prices),
            rules.low.apply(&prices),
            rules.close.apply(&prices),
        );
        let (Some(open), Some(high), Some(low), Some(close)) = ohlc else {
            warn!(code, %date, "dropping tick group with null price");
            continue;
        };

        let bar = OhlcvBar {
            code: code.to_string(),
            date,
            open,
            high,
            low,
            close,
            volume: rules.volume.apply(&volumes).unwrap_or(0.0),
            amount: rules.amount.apply(&amounts).unwrap_or(0.0),
        };

        if !bar.is_well_formed() {
            warn!(code, %date, open, high, low, close, "dropping malformed aggregated bar");
            continue;
        }
        bars.push(bar);
    }

    bars
}

/// Build ticks from a header row plus string records.
///
/// A missing required column rejects the whole input. Rows whose date or time
/// cannot be parsed are skipped; unparseable numbers become nulls.
pub fn ticks_from_records<H, V>(
    headers: &[H],
    records: &[Vec<V>],
) -> Result<Vec<IntradayTick>, ScreenerError>
where
    H: AsRef<str>,
    V: AsRef<str>,
{
    let index_of = |name: &str| {
        headers.iter().position(|h| {
            let h = h.as_ref().trim();
            h.eq_ignore_ascii_case(name)
                || (name == "code" && h.eq_ignore_ascii_case("ts_code"))
                || (name == "date" && h.eq_ignore_ascii_case("trade_date"))
        })
    };

    let mut idx = [0usize; 6];
    for (slot, name) in idx.iter_mut().zip(REQUIRED_TICK_COLUMNS) {
        *slot = index_of(name).ok_or_else(|| ScreenerError::Schema {
            reason: format!("missing required tick column '{name}'"),
        })?;
    }
    let [code_i, date_i, time_i, price_i, volume_i, amount_i] = idx;

    let field = |row: &[V], i: usize| row.get(i).map(|v| v.as_ref().trim().to_string());
    let number = |row: &[V], i: usize| field(row, i).and_then(|s| s.parse::<f64>().ok());

    let mut ticks = Vec::with_capacity(records.len());
    for (line, row) in records.iter().enumerate() {
        let row = row.as_slice();
        let Some(code) = field(row, code_i).filter(|c| !c.is_empty()) else {
            warn!(line, "skipping tick row without code");
            continue;
        };
        let Some(date) = field(row, date_i).and_then(|d| parse_date(&d).ok()) else {
            warn!(line, code = %code, "skipping tick row with invalid date");
            continue;
        };
        let Some(time) = field(row, time_i).and_then(|t| parse_time(&t)) else {
            warn!(line, code = %code, "skipping tick row with invalid time");
            continue;
        };
        ticks.push(IntradayTick {
            code,
            date,
            time,
            price: number(row, price_i),
            volume: number(row, volume_i),
            amount: number(row, amount_i),
        });
    }

    Ok(ticks)
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    ["%H:%M:%S", "%H:%M", "%H%M%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}
