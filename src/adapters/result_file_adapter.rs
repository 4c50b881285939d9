//! Writes screening results to `{dir}/{strategy}_{YYYYMMDD}.{csv|json}`.
//!
//! Each save overwrites the file for that strategy and date.

use crate::domain::error::ScreenerError;
use crate::domain::strategy::ScreeningResult;
use crate::domain::trade_date::{compact, iso};
use crate::ports::config_port::ConfigPort;
use crate::ports::result_port::ResultPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

pub struct FileResultAdapter {
    dir: PathBuf,
    format: OutputFormat,
}

fn write_err(e: impl std::fmt::Display) -> ScreenerError {
    ScreenerError::Io(std::io::Error::other(e.to_string()))
}

impl FileResultAdapter {
    pub fn new(dir: PathBuf, format: OutputFormat) -> Self {
        Self { dir, format }
    }

    /// `None` when `[output] dir` is not configured.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, ScreenerError> {
        let Some(dir) = config.get_string("output", "dir") else {
            return Ok(None);
        };
        let raw = config
            .get_string("output", "format")
            .unwrap_or_else(|| "csv".to_string());
        let format = OutputFormat::parse(&raw).ok_or_else(|| ScreenerError::ConfigInvalid {
            section: "output".into(),
            key: "format".into(),
            reason: format!("unknown format '{raw}'"),
        })?;
        Ok(Some(Self::new(PathBuf::from(dir), format)))
    }

    pub fn path_for(&self, strategy_name: &str, trade_date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.{}",
            strategy_name,
            compact(trade_date),
            self.format.extension()
        ))
    }

    fn render_csv(result: &ScreeningResult) -> Result<Vec<u8>, ScreenerError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        match result {
            ScreeningResult::Symbols(codes) => {
                wtr.write_record(["code"]).map_err(write_err)?;
                for code in codes {
                    wtr.write_record([code]).map_err(write_err)?;
                }
            }
            ScreeningResult::Table(rows) => {
                let metric_keys: BTreeSet<&str> = rows
                    .iter()
                    .flat_map(|r| r.metrics.keys().map(String::as_str))
                    .collect();
                let mut header = vec!["code", "date"];
                header.extend(metric_keys.iter().copied());
                header.push("note");
                wtr.write_record(&header).map_err(write_err)?;

                for row in rows {
                    let mut record = vec![row.code.clone(), iso(row.date)];
                    record.extend(metric_keys.iter().map(|k| {
                        row.metrics.get(*k).map(|v| v.to_string()).unwrap_or_default()
                    }));
                    record.push(row.note.clone().unwrap_or_default());
                    wtr.write_record(&record).map_err(write_err)?;
                }
            }
        }
        wtr.into_inner().map_err(write_err)
    }
}

impl ResultPort for FileResultAdapter {
    fn save(
        &self,
        strategy_name: &str,
        trade_date: NaiveDate,
        result: &ScreeningResult,
    ) -> Result<(), ScreenerError> {
        fs::create_dir_all(&self.dir)?;
        let bytes = match self.format {
            OutputFormat::Csv => Self::render_csv(result)?,
            OutputFormat::Json => serde_json::to_vec_pretty(result).map_err(write_err)?,
        };
        let path = self.path_for(strategy_name, trade_date);
        fs::write(&path, bytes)?;
        info!(strategy = strategy_name, path = %path.display(), rows = result.len(), "wrote screening result");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::ResultRow;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn table() -> ScreeningResult {
        ScreeningResult::Table(vec![
            ResultRow {
                code: "000001.SZ".into(),
                date: day(),
                metrics: BTreeMap::from([("close".to_string(), 10.5), ("kdj_j".to_string(), -2.0)]),
                note: Some("near MA20 (10.30)".into()),
            },
            ResultRow {
                code: "600000.SH".into(),
                date: day(),
                metrics: BTreeMap::from([("close".to_string(), 8.0)]),
                note: None,
            },
        ])
    }

    #[test]
    fn file_name_uses_compact_date() {
        let adapter = FileResultAdapter::new(PathBuf::from("out"), OutputFormat::Json);
        assert_eq!(
            adapter.path_for("oversold", day()),
            PathBuf::from("out").join("oversold_20240315.json")
        );
    }

    #[test]
    fn csv_table_has_union_of_metrics() {
        let dir = TempDir::new().unwrap();
        let adapter = FileResultAdapter::new(dir.path().to_path_buf(), OutputFormat::Csv);
        adapter.save("oversold", day(), &table()).unwrap();

        let content = fs::read_to_string(adapter.path_for("oversold", day())).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "code,date,close,kdj_j,note");
        assert_eq!(lines[1], "000001.SZ,2024-03-15,10.5,-2,near MA20 (10.30)");
        assert_eq!(lines[2], "600000.SH,2024-03-15,8,,");
    }

    #[test]
    fn json_round_trips_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let adapter = FileResultAdapter::new(dir.path().to_path_buf(), OutputFormat::Json);
        adapter
            .save("momentum", day(), &ScreeningResult::Symbols(vec!["A".into(), "B".into()]))
            .unwrap();
        let second = ScreeningResult::Symbols(vec!["C".into()]);
        adapter.save("momentum", day(), &second).unwrap();

        let content = fs::read_to_string(adapter.path_for("momentum", day())).unwrap();
        let back: ScreeningResult = serde_json::from_str(&content).unwrap();
        assert_eq!(back, second);
    }

    #[test]
    fn format_parse() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("xlsx"), None);
    }
}
