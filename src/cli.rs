//! CLI definition and dispatch.

use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::log_notifier::LogNotifier;
use crate::adapters::result_file_adapter::FileResultAdapter;
#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::batch::ScreeningContext;
use crate::domain::config_validation::{
    load_strategy_specs, validate_screening_config, DEFAULT_LOOKBACK_DAYS,
};
use crate::domain::error::ScreenerError;
use crate::domain::retry::RetryPolicy;
use crate::domain::scheduler::{SchedulerConfig, ScreeningScheduler, Sinks};
use crate::domain::strategy::params::StrategySpec;
use crate::domain::strategy::ScreeningResult;
use crate::domain::trade_date::{lookback_start, parse_date};
use crate::domain::universe::{parse_codes, resolve_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::result_port::ResultPort;

#[derive(Parser, Debug)]
#[command(name = "kline-screener", about = "End-of-day equity screener")]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Screen the universe with the configured strategies
    Screen {
        #[arg(short, long)]
        config: PathBuf,
        /// Trade date, YYYYMMDD or YYYY-MM-DD
        #[arg(long)]
        trade_date: Option<String>,
        /// Comma separated codes, replacing the configured universe
        #[arg(long)]
        codes: Option<String>,
        /// Run only this strategy section
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List symbols known to the data source
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a screening configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored data range for symbol(s)
    Info {
        #[arg(long)]
        code: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Install the stderr log subscriber. Safe to call more than once.
pub fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Screen {
            config,
            trade_date,
            codes,
            strategy,
            dry_run,
        } => run_screen(
            &config,
            trade_date.as_deref(),
            codes.as_deref(),
            strategy.as_deref(),
            dry_run,
        ),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Validate { config } => run_validate(&config),
        Command::Info { code, config } => run_info(code.as_deref(), &config),
    }
}

fn fail(err: &ScreenerError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Data source selected by `[screening] source`.
pub enum DataSource {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteAdapter),
    Csv(CsvAdapter),
}

impl DataSource {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScreenerError> {
        let source = config
            .get_string("screening", "source")
            .unwrap_or_else(|| "sqlite".to_string());
        match source.trim().to_lowercase().as_str() {
            "csv" => {
                let dir = config
                    .get_string("csv", "dir")
                    .ok_or_else(|| ScreenerError::ConfigMissing {
                        section: "csv".into(),
                        key: "dir".into(),
                    })?;
                Ok(DataSource::Csv(CsvAdapter::new(PathBuf::from(dir))))
            }
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let adapter = SqliteAdapter::from_config(config)?;
                adapter.initialize_schema()?;
                Ok(DataSource::Sqlite(adapter))
            }
            other => Err(ScreenerError::ConfigInvalid {
                section: "screening".into(),
                key: "source".into(),
                reason: format!("data source '{other}' is not available in this build"),
            }),
        }
    }

    pub fn port(&self) -> &dyn DataPort {
        match self {
            #[cfg(feature = "sqlite")]
            DataSource::Sqlite(a) => a,
            DataSource::Csv(a) => a,
        }
    }
}

/// Trade date from the override or `[screening] trade_date`, history start
/// from `start_date` or `lookback_days`.
pub fn build_screening_context(
    config: &dyn ConfigPort,
    trade_date_override: Option<&str>,
) -> Result<ScreeningContext, ScreenerError> {
    let raw = trade_date_override
        .map(str::to_string)
        .or_else(|| config.get_string("screening", "trade_date"))
        .ok_or_else(|| ScreenerError::ConfigMissing {
            section: "screening".into(),
            key: "trade_date".into(),
        })?;
    let trade_date = parse_date(&raw)?;

    let history_start = match config.get_string("screening", "start_date") {
        Some(s) => parse_date(&s)?,
        None => {
            let days = config.get_int("screening", "lookback_days", DEFAULT_LOOKBACK_DAYS);
            lookback_start(trade_date, u32::try_from(days.max(1)).unwrap_or(u32::MAX))
        }
    };
    if history_start > trade_date {
        return Err(ScreenerError::ConfigInvalid {
            section: "screening".into(),
            key: "start_date".into(),
            reason: "start_date must not be after trade_date".into(),
        });
    }
    Ok(ScreeningContext::new(trade_date, history_start))
}

/// Specs to run: all configured ones, or the single one named on the CLI.
pub fn select_strategies(
    config: &dyn ConfigPort,
    only: Option<&str>,
) -> Result<Vec<StrategySpec>, ScreenerError> {
    let specs = load_strategy_specs(config)?;
    match only {
        None => Ok(specs),
        Some(name) => {
            let name = name.trim();
            let selected: Vec<StrategySpec> = specs
                .into_iter()
                .filter(|s| s.name().eq_ignore_ascii_case(name))
                .collect();
            if selected.is_empty() {
                return Err(ScreenerError::ConfigInvalid {
                    section: "screening".into(),
                    key: "strategies".into(),
                    reason: format!("strategy '{name}' is not configured"),
                });
            }
            Ok(selected)
        }
    }
}

/// Codes named on the CLI or in `[screening] codes`, if any.
pub fn resolve_codes(code_override: Option<&str>, config: &dyn ConfigPort) -> Option<String> {
    code_override
        .map(str::to_string)
        .or_else(|| config.get_string("screening", "codes"))
        .filter(|s| !s.trim().is_empty())
}

fn print_result(strategy: &str, result: &ScreeningResult) {
    match result {
        ScreeningResult::Symbols(codes) => {
            for code in codes {
                println!("{strategy}\t{code}");
            }
        }
        ScreeningResult::Table(rows) => {
            for row in rows {
                let metrics: Vec<String> = row
                    .metrics
                    .iter()
                    .map(|(k, v)| format!("{k}={v:.4}"))
                    .collect();
                println!(
                    "{strategy}\t{}\t{}\t{}",
                    row.code,
                    metrics.join(" "),
                    row.note.as_deref().unwrap_or("")
                );
            }
        }
    }
}

fn run_screen(
    config_path: &Path,
    trade_date: Option<&str>,
    codes: Option<&str>,
    strategy: Option<&str>,
    dry_run: bool,
) -> ExitCode {
    let mut config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    if let Some(date) = trade_date {
        config.set("screening", "trade_date", date);
    }
    if let Some(codes) = codes {
        config.set("screening", "codes", codes);
    }

    if let Err(e) = validate_screening_config(&config) {
        return fail(&e);
    }
    let specs = match select_strategies(&config, strategy) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let ctx = match build_screening_context(&config, None) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let scheduler_config = SchedulerConfig::from_config(&config);
    let codes = resolve_codes(None, &config);

    if dry_run {
        eprintln!("Trade date:    {}", ctx.trade_date);
        eprintln!("History from:  {}", ctx.history_start);
        eprintln!("Workers:       {}", scheduler_config.workers);
        match &codes {
            Some(list) => eprintln!("Universe:      {list}"),
            None => eprintln!("Universe:      all symbols in data source"),
        }
        eprintln!("\nStrategies:");
        for spec in &specs {
            eprintln!("  {} ({})", spec.name(), spec.kind().as_str());
            for (key, value) in spec.params().iter() {
                eprintln!("    {key} = {value}");
            }
        }
        eprintln!("\nDry run complete: configuration is valid");
        return ExitCode::SUCCESS;
    }

    let source = match DataSource::from_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let symbols = match resolve_universe(source.port(), codes.as_deref()) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let file_sink = match FileResultAdapter::from_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    #[cfg(feature = "sqlite")]
    let db_sink = if config.get_bool("output", "sqlite", false) {
        match SqliteAdapter::from_config(&config).and_then(|a| a.initialize_schema().map(|_| a)) {
            Ok(a) => Some(a),
            Err(e) => return fail(&e),
        }
    } else {
        None
    };
    #[cfg(not(feature = "sqlite"))]
    if config.get_bool("output", "sqlite", false) {
        tracing::warn!("[output] sqlite requested but this build has no sqlite support");
    }

    let mut results: Vec<&dyn ResultPort> = Vec::new();
    if let Some(sink) = &file_sink {
        results.push(sink);
    }
    #[cfg(feature = "sqlite")]
    if let Some(sink) = &db_sink {
        results.push(sink);
    }

    let notifier = LogNotifier;
    let sinks = Sinks {
        results,
        notifier: Some(&notifier),
        retry: RetryPolicy::from_config(&config),
    };

    let scheduler = ScreeningScheduler::new(source.port(), scheduler_config);
    let reports = match scheduler.run_strategies(&specs, &symbols, &ctx, &sinks) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let mut failed = false;
    for (run, summary) in &reports {
        print_result(&run.strategy, &run.result);
        eprintln!(
            "{}: {} matched of {} ({} excluded, {} errored)",
            run.strategy,
            run.result.len(),
            run.counters.total,
            run.counters.excluded(),
            run.counters.errored
        );
        if let Some(err) = &summary.error {
            eprintln!("error: {}: {err}", run.strategy);
            failed = true;
        }
    }

    if failed {
        ExitCode::from(3)
    } else {
        ExitCode::SUCCESS
    }
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let source = match DataSource::from_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match source.port().list_symbols() {
        Ok(symbols) if symbols.is_empty() => {
            eprintln!("No symbols found");
            ExitCode::SUCCESS
        }
        Ok(symbols) => {
            for symbol in &symbols {
                println!("{symbol}");
            }
            eprintln!("{} symbols found", symbols.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    if let Err(e) = validate_screening_config(&config) {
        return fail(&e);
    }
    let specs = match load_strategy_specs(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    for spec in &specs {
        eprintln!("  {} ({}): ok", spec.name(), spec.kind().as_str());
    }

    eprintln!("\nScreening configuration is valid.");
    ExitCode::SUCCESS
}

fn run_info(code: Option<&str>, config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let source = match DataSource::from_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let codes = match resolve_codes(code, &config) {
        Some(list) => match parse_codes(&list) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        },
        None => match source.port().list_symbols() {
            Ok(s) => s,
            Err(e) => return fail(&e),
        },
    };

    for c in &codes {
        match source.port().get_data_range(c) {
            Ok(Some((min_date, max_date, count))) => {
                println!("{c}: {count} bars, {min_date} to {max_date}");
            }
            Ok(None) => eprintln!("{c}: no data found"),
            Err(e) => eprintln!("error querying {c}: {e}"),
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn cli_parses_screen_overrides() {
        let cli = Cli::parse_from([
            "kline-screener",
            "-v",
            "screen",
            "-c",
            "screen.ini",
            "--trade-date",
            "20240315",
            "--codes",
            "000001.SZ",
            "--dry-run",
        ]);
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Screen {
                trade_date,
                codes,
                dry_run,
                strategy,
                ..
            } => {
                assert_eq!(trade_date.as_deref(), Some("20240315"));
                assert_eq!(codes.as_deref(), Some("000001.SZ"));
                assert!(dry_run);
                assert!(strategy.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn context_uses_lookback() {
        let cfg = config("[screening]\ntrade_date = 2024-03-15\nlookback_days = 10\n");
        let ctx = build_screening_context(&cfg, None).unwrap();
        assert_eq!(ctx.trade_date, parse_date("20240315").unwrap());
        assert_eq!(ctx.history_start, parse_date("20240305").unwrap());
    }

    #[test]
    fn context_override_wins_and_start_date_is_used() {
        let cfg = config("[screening]\ntrade_date = 20240101\nstart_date = 20231201\n");
        let ctx = build_screening_context(&cfg, Some("20240110")).unwrap();
        assert_eq!(ctx.trade_date, parse_date("20240110").unwrap());
        assert_eq!(ctx.history_start, parse_date("20231201").unwrap());
    }

    #[test]
    fn context_requires_trade_date() {
        let cfg = config("[screening]\nlookback_days = 10\n");
        assert!(matches!(
            build_screening_context(&cfg, None),
            Err(ScreenerError::ConfigMissing { key, .. }) if key == "trade_date"
        ));
    }

    #[test]
    fn select_single_strategy() {
        let cfg = config(
            "[screening]\nstrategies = a, b\n[a]\nkind = momentum\n[b]\nkind = oversold_reversion\n",
        );
        let specs = select_strategies(&cfg, Some("b")).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name(), "b");
        assert!(select_strategies(&cfg, Some("c")).is_err());
    }

    #[test]
    fn resolve_codes_prefers_override() {
        let cfg = config("[screening]\ncodes = 000001.SZ\n");
        assert_eq!(resolve_codes(Some("600000.SH"), &cfg).as_deref(), Some("600000.SH"));
        assert_eq!(resolve_codes(None, &cfg).as_deref(), Some("000001.SZ"));
        assert_eq!(resolve_codes(None, &config("[screening]\n")), None);
    }
}
