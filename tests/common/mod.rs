#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveTime};
use kline_screener::domain::error::ScreenerError;
pub use kline_screener::domain::ohlcv::{HistoricalBar, OhlcvBar};
use kline_screener::domain::tick::IntradayTick;
use kline_screener::ports::data_port::DataPort;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

pub struct MockDataPort {
    pub history: HashMap<String, Vec<HistoricalBar>>,
    pub ticks: HashMap<String, Vec<IntradayTick>>,
    pub errors: HashMap<String, String>,
    pub panics: HashSet<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            history: HashMap::new(),
            ticks: HashMap::new(),
            errors: HashMap::new(),
            panics: HashSet::new(),
        }
    }

    pub fn with_history(mut self, code: &str, bars: Vec<HistoricalBar>) -> Self {
        self.history.insert(code.to_string(), bars);
        self
    }

    pub fn with_ticks(mut self, code: &str, ticks: Vec<IntradayTick>) -> Self {
        self.ticks.insert(code.to_string(), ticks);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    pub fn with_panic(mut self, code: &str) -> Self {
        self.panics.insert(code.to_string());
        self
    }

    fn check_faults(&self, code: &str) -> Result<(), ScreenerError> {
        if self.panics.contains(code) {
            panic!("injected fault for {code}");
        }
        if let Some(reason) = self.errors.get(code) {
            return Err(ScreenerError::Database {
                reason: reason.clone(),
            });
        }
        Ok(())
    }
}

impl DataPort for MockDataPort {
    fn fetch_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<HistoricalBar>, ScreenerError> {
        self.check_faults(code)?;
        Ok(self
            .history
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_ticks(&self, code: &str, date: NaiveDate) -> Result<Vec<IntradayTick>, ScreenerError> {
        self.check_faults(code)?;
        Ok(self
            .ticks
            .get(code)
            .map(|ticks| ticks.iter().filter(|t| t.date == date).cloned().collect())
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, ScreenerError> {
        let mut codes: Vec<String> = self.history.keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, ScreenerError> {
        self.check_faults(code)?;
        Ok(self.history.get(code).and_then(|bars| {
            let min = bars.iter().map(|b| b.date).min()?;
            let max = bars.iter().map(|b| b.date).max()?;
            Some((min, max, bars.len()))
        }))
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_hist_bar(code: &str, day: NaiveDate, close: f64, volume: f64) -> HistoricalBar {
    HistoricalBar {
        code: code.to_string(),
        date: day,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume,
        amount: close * volume,
        ..Default::default()
    }
}

pub fn make_tick(code: &str, day: NaiveDate, hh: u32, mm: u32, price: f64, volume: f64) -> IntradayTick {
    IntradayTick {
        code: code.to_string(),
        date: day,
        time: NaiveTime::from_hms_opt(hh, mm, 0).unwrap(),
        price: Some(price),
        volume: Some(volume),
        amount: Some(price * volume),
    }
}

/// One bar per calendar day ending on `last`, closes taken from `closes`.
pub fn bars_ending(code: &str, last: NaiveDate, closes: &[f64]) -> Vec<HistoricalBar> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_hist_bar(code, last - Duration::days(n - 1 - i as i64), c, 1000.0))
        .collect()
}

/// `count` bars ending on `last` with a gentle sine-wave drift.
pub fn generate_bars(code: &str, last: NaiveDate, count: usize, seed: f64) -> Vec<HistoricalBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| 20.0 + seed + 3.0 * ((i as f64 + seed) * 0.3).sin())
        .collect();
    bars_ending(code, last, &closes)
}

/// History rows as a CSV file body readable by the CSV data adapter.
pub fn history_csv(bars: &[HistoricalBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume,amount\n");
    for b in bars {
        writeln!(
            out,
            "{},{},{},{},{},{},{}",
            b.date.format("%Y-%m-%d"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume,
            b.amount
        )
        .unwrap();
    }
    out
}
