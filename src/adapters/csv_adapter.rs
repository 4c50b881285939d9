//! CSV file data adapter.
//!
//! Layout under the base directory:
//! - `{code}.csv`: daily history with a header row. Required columns are
//!   `date, open, high, low, close, volume`; `amount` and the `*_adj`
//!   columns are optional.
//! - `ticks/{code}_{YYYYMMDD}.csv`: intraday ticks for one day.

use crate::domain::aggregator::ticks_from_records;
use crate::domain::error::ScreenerError;
use crate::domain::ohlcv::HistoricalBar;
use crate::domain::tick::IntradayTick;
use crate::domain::trade_date::{compact, parse_date};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const TICKS_DIR: &str = "ticks";

pub struct CsvAdapter {
    base_path: PathBuf,
}

/// Column positions of a history file, resolved from its header row.
struct HistoryColumns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    amount: Option<usize>,
    open_adj: Option<usize>,
    high_adj: Option<usize>,
    low_adj: Option<usize>,
    close_adj: Option<usize>,
}

impl HistoryColumns {
    fn from_headers(headers: &csv::StringRecord, path: &Path) -> Result<Self, ScreenerError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| ScreenerError::Schema {
                reason: format!("{}: missing column '{}'", path.display(), names[0]),
            })
        };
        Ok(Self {
            date: require(&["date", "trade_date"])?,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close"])?,
            volume: require(&["volume", "vol"])?,
            amount: find(&["amount"]),
            open_adj: find(&["open_adj", "open_qfq"]),
            high_adj: find(&["high_adj", "high_qfq"]),
            low_adj: find(&["low_adj", "low_qfq"]),
            close_adj: find(&["close_adj", "close_qfq"]),
        })
    }
}

fn number(record: &csv::StringRecord, idx: usize, name: &str, line: usize) -> Result<f64, ScreenerError> {
    let raw = record.get(idx).unwrap_or("").trim();
    raw.parse::<f64>().map_err(|e| ScreenerError::DatabaseQuery {
        reason: format!("line {line}: invalid {name} value '{raw}': {e}"),
    })
}

fn optional_number(record: &csv::StringRecord, idx: Option<usize>) -> Option<f64> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<f64>().ok())
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn history_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{code}.csv"))
    }

    fn ticks_path(&self, code: &str, date: NaiveDate) -> PathBuf {
        self.base_path
            .join(TICKS_DIR)
            .join(format!("{}_{}.csv", code, compact(date)))
    }

    /// File contents, or `None` when the file does not exist.
    fn read_optional(path: &Path) -> Result<Option<String>, ScreenerError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScreenerError::Database {
                reason: format!("failed to read {}: {}", path.display(), e),
            }),
        }
    }

    fn read_history(&self, code: &str) -> Result<Vec<HistoricalBar>, ScreenerError> {
        let path = self.history_path(code);
        let Some(content) = Self::read_optional(&path)? else {
            debug!(code, path = %path.display(), "no history file");
            return Ok(Vec::new());
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| ScreenerError::Schema {
                reason: format!("{}: {}", path.display(), e),
            })?
            .clone();
        let cols = HistoryColumns::from_headers(&headers, &path)?;

        let mut bars = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let line = i + 2;
            let record = result.map_err(|e| ScreenerError::DatabaseQuery {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            let date_str = record.get(cols.date).unwrap_or("");
            let date = parse_date(date_str)?;

            bars.push(HistoricalBar {
                code: code.to_string(),
                date,
                open: number(&record, cols.open, "open", line)?,
                high: number(&record, cols.high, "high", line)?,
                low: number(&record, cols.low, "low", line)?,
                close: number(&record, cols.close, "close", line)?,
                volume: number(&record, cols.volume, "volume", line)?,
                amount: optional_number(&record, cols.amount).unwrap_or(0.0),
                open_adj: optional_number(&record, cols.open_adj),
                high_adj: optional_number(&record, cols.high_adj),
                low_adj: optional_number(&record, cols.low_adj),
                close_adj: optional_number(&record, cols.close_adj),
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<HistoricalBar>, ScreenerError> {
        let mut bars = self.read_history(code)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        Ok(bars)
    }

    fn fetch_ticks(&self, code: &str, date: NaiveDate) -> Result<Vec<IntradayTick>, ScreenerError> {
        let path = self.ticks_path(code, date);
        let Some(content) = Self::read_optional(&path)? else {
            return Ok(Vec::new());
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| ScreenerError::Schema {
                reason: format!("{}: {}", path.display(), e),
            })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ScreenerError::DatabaseQuery {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;
            records.push(record.iter().map(str::to_string).collect::<Vec<String>>());
        }

        let mut ticks = ticks_from_records(&headers, &records)?;
        ticks.retain(|t| t.code == code && t.date == date);
        Ok(ticks)
    }

    fn list_symbols(&self) -> Result<Vec<String>, ScreenerError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| ScreenerError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ScreenerError::Database {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().to_uppercase());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, ScreenerError> {
        let bars = self.read_history(code)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("000001.SZ.csv"),
            "date,open,high,low,close,volume,amount,close_adj\n\
             2024-01-17,11.0,12.0,10.5,11.5,55000,632500,\n\
             2024-01-15,10.0,11.0,9.0,10.5,50000,525000,10.2\n\
             20240116,10.5,11.5,10.0,11.0,60000,660000,\n",
        )
        .unwrap();
        fs::write(path.join("600000.SH.csv"), "date,open,high,low,close,volume\n").unwrap();

        fs::create_dir(path.join(TICKS_DIR)).unwrap();
        fs::write(
            path.join(TICKS_DIR).join("000001.SZ_20240118.csv"),
            "ts_code,trade_date,time,price,volume,amount\n\
             000001.SZ,20240118,09:31:00,11.6,100,1160\n\
             000001.SZ,20240118,10:00:00,11.8,200,2360\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_history_sorts_and_reads_optional_columns() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_history("000001.SZ", date(1), date(31)).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, date(15));
        assert_eq!(bars[0].close_adj, Some(10.2));
        assert_eq!(bars[0].to_canonical().close, 10.2);
        assert_eq!(bars[1].date, date(16));
        assert_eq!(bars[1].close_adj, None);
        assert_eq!(bars[2].volume, 55000.0);
        assert_eq!(bars[2].amount, 632500.0);
    }

    #[test]
    fn fetch_history_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_history("000001.SZ", date(16), date(16)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, date(16));
    }

    #[test]
    fn missing_file_means_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert!(adapter.fetch_history("000002.SZ", date(1), date(31)).unwrap().is_empty());
        assert!(adapter.fetch_ticks("000002.SZ", date(18)).unwrap().is_empty());
    }

    #[test]
    fn missing_column_is_schema_error() {
        let (_dir, path) = setup_test_data();
        fs::write(path.join("000002.SZ.csv"), "date,open,high,low,close\n2024-01-15,1,1,1,1\n")
            .unwrap();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_history("000002.SZ", date(1), date(31)).unwrap_err();
        assert!(matches!(err, ScreenerError::Schema { .. }));
    }

    #[test]
    fn fetch_ticks_reads_day_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let ticks = adapter.fetch_ticks("000001.SZ", date(18)).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[1].price, Some(11.8));
    }

    #[test]
    fn list_symbols_skips_tick_directory() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_symbols().unwrap(), vec!["000001.SZ", "600000.SH"]);
    }

    #[test]
    fn data_range_from_file() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(
            adapter.get_data_range("000001.SZ").unwrap(),
            Some((date(15), date(17), 3))
        );
        assert_eq!(adapter.get_data_range("600000.SH").unwrap(), None);
    }
}
