//! SQLite storage adapter: daily bars, intraday ticks and screening results.

use crate::domain::error::ScreenerError;
use crate::domain::ohlcv::HistoricalBar;
use crate::domain::strategy::{ResultRow, ResultShape, ScreeningResult};
use crate::domain::tick::IntradayTick;
use crate::domain::trade_date::iso;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::result_port::ResultPort;
use chrono::{NaiveDate, NaiveTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, ErrorCode, Row};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Busy and locked databases are worth retrying; everything else is not.
fn query_err(e: rusqlite::Error) -> ScreenerError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            ScreenerError::TransientStorage {
                reason: e.to_string(),
            }
        }
        _ => ScreenerError::DatabaseQuery {
            reason: e.to_string(),
        },
    }
}

fn conversion_err(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_err(idx, e))
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveTime> {
    let s: String = row.get(idx)?;
    NaiveTime::parse_from_str(&s, "%H:%M:%S").map_err(|e| conversion_err(idx, e))
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScreenerError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| ScreenerError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|c| c.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS)));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| ScreenerError::Database {
                reason: e.to_string(),
            })?;

        info!(path = %db_path, pool_size, "opened sqlite database");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, ScreenerError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| ScreenerError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ScreenerError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| ScreenerError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), ScreenerError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS daily_bars (
                    code TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume REAL NOT NULL,
                    amount REAL NOT NULL DEFAULT 0,
                    open_adj REAL,
                    high_adj REAL,
                    low_adj REAL,
                    close_adj REAL,
                    PRIMARY KEY (code, date)
                );
                CREATE INDEX IF NOT EXISTS idx_daily_bars_date ON daily_bars(date);
                CREATE TABLE IF NOT EXISTS intraday_ticks (
                    code TEXT NOT NULL,
                    date TEXT NOT NULL,
                    time TEXT NOT NULL,
                    price REAL,
                    volume REAL,
                    amount REAL,
                    PRIMARY KEY (code, date, time)
                );
                CREATE TABLE IF NOT EXISTS screening_runs (
                    strategy TEXT NOT NULL,
                    trade_date TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    matched INTEGER NOT NULL,
                    PRIMARY KEY (strategy, trade_date)
                );
                CREATE TABLE IF NOT EXISTS screening_results (
                    strategy TEXT NOT NULL,
                    trade_date TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    code TEXT NOT NULL,
                    row_json TEXT,
                    PRIMARY KEY (strategy, trade_date, seq)
                );",
            )
            .map_err(query_err)
    }

    pub fn insert_bars(&self, bars: &[HistoricalBar]) -> Result<(), ScreenerError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO daily_bars
                 (code, date, open, high, low, close, volume, amount,
                  open_adj, high_adj, low_adj, close_adj)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    bar.code,
                    iso(bar.date),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                    bar.amount,
                    bar.open_adj,
                    bar.high_adj,
                    bar.low_adj,
                    bar.close_adj
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        debug!(rows = bars.len(), "inserted daily bars");
        Ok(())
    }

    pub fn insert_ticks(&self, ticks: &[IntradayTick]) -> Result<(), ScreenerError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for tick in ticks {
            tx.execute(
                "INSERT OR REPLACE INTO intraday_ticks (code, date, time, price, volume, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    tick.code,
                    iso(tick.date),
                    tick.time.format("%H:%M:%S").to_string(),
                    tick.price,
                    tick.volume,
                    tick.amount
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        debug!(rows = ticks.len(), "inserted intraday ticks");
        Ok(())
    }

    /// Read back a saved result, `None` when the strategy never ran that day.
    pub fn load_result(
        &self,
        strategy_name: &str,
        trade_date: NaiveDate,
    ) -> Result<Option<ScreeningResult>, ScreenerError> {
        let conn = self.conn()?;
        let date = iso(trade_date);

        let kind: Option<String> = match conn.query_row(
            "SELECT kind FROM screening_runs WHERE strategy = ?1 AND trade_date = ?2",
            params![strategy_name, date],
            |row| row.get(0),
        ) {
            Ok(kind) => Some(kind),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(query_err(e)),
        };
        let Some(kind) = kind else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT code, row_json FROM screening_results
                 WHERE strategy = ?1 AND trade_date = ?2 ORDER BY seq",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![strategy_name, date], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })
            .map_err(query_err)?;

        let mut codes = Vec::new();
        let mut table = Vec::new();
        for row in rows {
            let (code, json) = row.map_err(query_err)?;
            match json {
                Some(json) => {
                    let parsed: ResultRow = serde_json::from_str(&json).map_err(|e| {
                        ScreenerError::DatabaseQuery {
                            reason: format!("corrupt result row for {code}: {e}"),
                        }
                    })?;
                    table.push(parsed);
                }
                None => codes.push(code),
            }
        }

        Ok(Some(if kind == "table" {
            ScreeningResult::Table(table)
        } else {
            ScreeningResult::Symbols(codes)
        }))
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<HistoricalBar>, ScreenerError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT code, date, open, high, low, close, volume, amount,
                        open_adj, high_adj, low_adj, close_adj
                 FROM daily_bars
                 WHERE code = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![code, iso(start_date), iso(end_date)], |row| {
                Ok(HistoricalBar {
                    code: row.get(0)?,
                    date: date_col(row, 1)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                    amount: row.get(7)?,
                    open_adj: row.get(8)?,
                    high_adj: row.get(9)?,
                    low_adj: row.get(10)?,
                    close_adj: row.get(11)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn fetch_ticks(&self, code: &str, date: NaiveDate) -> Result<Vec<IntradayTick>, ScreenerError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT code, date, time, price, volume, amount
                 FROM intraday_ticks
                 WHERE code = ?1 AND date = ?2
                 ORDER BY time ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![code, iso(date)], |row| {
                Ok(IntradayTick {
                    code: row.get(0)?,
                    date: date_col(row, 1)?,
                    time: time_col(row, 2)?,
                    price: row.get(3)?,
                    volume: row.get(4)?,
                    amount: row.get(5)?,
                })
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn list_symbols(&self) -> Result<Vec<String>, ScreenerError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT code FROM daily_bars
                 UNION
                 SELECT code FROM intraday_ticks
                 ORDER BY code",
            )
            .map_err(query_err)?;

        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, ScreenerError> {
        let conn = self.conn()?;

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM daily_bars WHERE code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e: chrono::ParseError| {
                        ScreenerError::Database {
                            reason: e.to_string(),
                        }
                    })
                };
                Ok(Some((parse(&min_str)?, parse(&max_str)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl ResultPort for SqliteAdapter {
    /// Replace whatever was stored for `(strategy_name, trade_date)` in one
    /// transaction.
    fn save(
        &self,
        strategy_name: &str,
        trade_date: NaiveDate,
        result: &ScreeningResult,
    ) -> Result<(), ScreenerError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let date = iso(trade_date);
        let kind = match result.shape() {
            ResultShape::Symbols => "symbols",
            ResultShape::Table => "table",
        };

        tx.execute(
            "DELETE FROM screening_results WHERE strategy = ?1 AND trade_date = ?2",
            params![strategy_name, date],
        )
        .map_err(query_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO screening_runs (strategy, trade_date, kind, matched)
             VALUES (?1, ?2, ?3, ?4)",
            params![strategy_name, date, kind, result.len() as i64],
        )
        .map_err(query_err)?;

        let entries: Vec<(String, Option<String>)> = match result {
            ScreeningResult::Symbols(codes) => codes.iter().map(|c| (c.clone(), None)).collect(),
            ScreeningResult::Table(rows) => rows
                .iter()
                .map(|r| {
                    serde_json::to_string(r)
                        .map(|json| (r.code.clone(), Some(json)))
                        .map_err(|e| ScreenerError::DatabaseQuery {
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<_, _>>()?,
        };
        for (seq, (code, json)) in entries.iter().enumerate() {
            tx.execute(
                "INSERT INTO screening_results (strategy, trade_date, seq, code, row_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![strategy_name, date, seq as i64, code, json],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        info!(strategy = strategy_name, trade_date = %trade_date, rows = entries.len(), "saved screening result to sqlite");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct EmptyConfig;

    impl ConfigPort for EmptyConfig {
        fn get_string(&self, _section: &str, _key: &str) -> Option<String> {
            None
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn adapter() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn hist(code: &str, d: u32, close: f64) -> HistoricalBar {
        HistoricalBar {
            code: code.to_string(),
            date: date(d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
            amount: close * 1000.0,
            ..HistoricalBar::default()
        }
    }

    #[test]
    fn from_config_missing_path() {
        match SqliteAdapter::from_config(&EmptyConfig) {
            Err(ScreenerError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn fetch_history_respects_range_and_adjusted_columns() {
        let adapter = adapter();
        let mut adjusted = hist("000001.SZ", 2, 10.0);
        adjusted.close_adj = Some(9.5);
        adapter
            .insert_bars(&[hist("000001.SZ", 1, 10.0), adjusted, hist("000001.SZ", 5, 11.0)])
            .unwrap();

        let fetched = adapter.fetch_history("000001.SZ", date(1), date(2)).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].close_adj, None);
        assert_eq!(fetched[1].close_adj, Some(9.5));
        assert_eq!(fetched[1].to_canonical().close, 9.5);
    }

    #[test]
    fn fetch_ticks_round_trip_with_nulls() {
        let adapter = adapter();
        let tick = IntradayTick {
            code: "600000.SH".into(),
            date: date(3),
            time: NaiveTime::from_hms_opt(9, 31, 0).unwrap(),
            price: Some(8.5),
            volume: None,
            amount: None,
        };
        adapter.insert_ticks(std::slice::from_ref(&tick)).unwrap();
        assert_eq!(adapter.fetch_ticks("600000.SH", date(3)).unwrap(), vec![tick]);
        assert!(adapter.fetch_ticks("600000.SH", date(4)).unwrap().is_empty());
    }

    #[test]
    fn list_symbols_covers_bars_and_ticks() {
        let adapter = adapter();
        adapter
            .insert_bars(&[hist("600000.SH", 1, 8.0), hist("000001.SZ", 1, 10.0)])
            .unwrap();
        adapter
            .insert_ticks(&[IntradayTick {
                code: "830799.BJ".into(),
                date: date(1),
                time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                price: Some(5.0),
                volume: Some(10.0),
                amount: Some(50.0),
            }])
            .unwrap();
        assert_eq!(
            adapter.list_symbols().unwrap(),
            vec!["000001.SZ", "600000.SH", "830799.BJ"]
        );
    }

    #[test]
    fn data_range() {
        let adapter = adapter();
        adapter
            .insert_bars(&[hist("000001.SZ", 1, 10.0), hist("000001.SZ", 5, 10.0)])
            .unwrap();
        assert_eq!(
            adapter.get_data_range("000001.SZ").unwrap(),
            Some((date(1), date(5), 2))
        );
        assert_eq!(adapter.get_data_range("600000.SH").unwrap(), None);
    }

    #[test]
    fn save_is_idempotent() {
        let adapter = adapter();
        let first = ScreeningResult::Symbols(vec!["A".into(), "B".into()]);
        let second = ScreeningResult::Symbols(vec!["C".into()]);

        adapter.save("momentum", date(3), &first).unwrap();
        adapter.save("momentum", date(3), &first).unwrap();
        assert_eq!(adapter.load_result("momentum", date(3)).unwrap(), Some(first));

        adapter.save("momentum", date(3), &second).unwrap();
        assert_eq!(adapter.load_result("momentum", date(3)).unwrap(), Some(second));
        assert_eq!(adapter.load_result("momentum", date(4)).unwrap(), None);
    }

    #[test]
    fn table_results_keep_metrics() {
        let adapter = adapter();
        let table = ScreeningResult::Table(vec![ResultRow {
            code: "000001.SZ".into(),
            date: date(3),
            metrics: BTreeMap::from([("kdj_j".to_string(), -3.5)]),
            note: Some("near MA20 (10.00)".into()),
        }]);
        adapter.save("oversold", date(3), &table).unwrap();
        assert_eq!(adapter.load_result("oversold", date(3)).unwrap(), Some(table));

        adapter.save("oversold", date(3), &ScreeningResult::Table(vec![])).unwrap();
        assert_eq!(
            adapter.load_result("oversold", date(3)).unwrap(),
            Some(ScreeningResult::Table(vec![]))
        );
    }
}
