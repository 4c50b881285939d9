//! Configuration validation.
//!
//! Checks every screening-related section before a run starts so that a bad
//! config fails fast with the offending section and key.

use crate::domain::error::ScreenerError;
use crate::domain::strategy::params::StrategySpec;
use crate::domain::trade_date::parse_date;
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;

pub fn validate_screening_config(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    validate_dates(config)?;
    validate_workers(config)?;
    validate_codes(config)?;
    validate_source(config)?;
    validate_output(config)?;
    validate_retry(config)?;
    load_strategy_specs(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> ScreenerError {
    ScreenerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn optional_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, ScreenerError> {
    config
        .get_string("screening", key)
        .map(|s| parse_date(&s).map_err(|e| invalid("screening", key, &e.to_string())))
        .transpose()
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    let trade_date = optional_date(config, "trade_date")?;
    let start_date = optional_date(config, "start_date")?;

    if let (Some(start), Some(trade)) = (start_date, trade_date) {
        if start > trade {
            return Err(invalid(
                "screening",
                "start_date",
                "start_date must not be after trade_date",
            ));
        }
    }

    let lookback = config.get_int("screening", "lookback_days", DEFAULT_LOOKBACK_DAYS);
    if lookback <= 0 || lookback > u32::MAX as i64 {
        return Err(invalid("screening", "lookback_days", "lookback_days must be positive"));
    }
    Ok(())
}

fn validate_workers(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    if config.get_int("screening", "workers", 0) < 0 {
        return Err(invalid("screening", "workers", "workers must be non-negative"));
    }
    if config.get_int("screening", "batch_size", 0) < 0 {
        return Err(invalid("screening", "batch_size", "batch_size must be non-negative"));
    }
    Ok(())
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    match config.get_string("screening", "codes") {
        Some(s) => parse_codes(&s)
            .map(|_| ())
            .map_err(|e| invalid("screening", "codes", &e.to_string())),
        None => Ok(()),
    }
}

fn validate_source(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    let source = config
        .get_string("screening", "source")
        .unwrap_or_else(|| "sqlite".to_string());
    let (section, key) = match source.trim().to_lowercase().as_str() {
        "sqlite" => ("sqlite", "path"),
        "csv" => ("csv", "dir"),
        other => {
            return Err(invalid(
                "screening",
                "source",
                &format!("unknown data source '{other}', expected sqlite or csv"),
            ));
        }
    };
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(ScreenerError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_output(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    if let Some(format) = config.get_string("output", "format") {
        if !matches!(format.trim().to_lowercase().as_str(), "csv" | "json") {
            return Err(invalid("output", "format", "format must be csv or json"));
        }
    }
    if let Some(dir) = config.get_string("output", "dir") {
        if dir.trim().is_empty() {
            return Err(invalid("output", "dir", "dir must not be empty"));
        }
    }
    Ok(())
}

fn validate_retry(config: &dyn ConfigPort) -> Result<(), ScreenerError> {
    if config.get_int("retry", "max_attempts", 1) < 1 {
        return Err(invalid("retry", "max_attempts", "max_attempts must be at least 1"));
    }
    if config.get_int("retry", "backoff_multiplier", 1) < 1 {
        return Err(invalid(
            "retry",
            "backoff_multiplier",
            "backoff_multiplier must be at least 1",
        ));
    }
    for key in ["backoff_ms_initial", "backoff_ms_max"] {
        if config.get_int("retry", key, 0) < 0 {
            return Err(invalid("retry", key, &format!("{key} must be non-negative")));
        }
    }
    Ok(())
}

/// Build one spec per section named in `[screening] strategies`.
pub fn load_strategy_specs(config: &dyn ConfigPort) -> Result<Vec<StrategySpec>, ScreenerError> {
    let list = config
        .get_string("screening", "strategies")
        .ok_or_else(|| ScreenerError::ConfigMissing {
            section: "screening".to_string(),
            key: "strategies".to_string(),
        })?;

    let mut specs: Vec<StrategySpec> = Vec::new();
    for name in list.split(',').map(str::trim) {
        if name.is_empty() {
            return Err(invalid("screening", "strategies", "empty strategy name"));
        }
        if specs.iter().any(|s| s.name() == name) {
            return Err(invalid(
                "screening",
                "strategies",
                &format!("duplicate strategy '{name}'"),
            ));
        }
        specs.push(StrategySpec::from_config(config, name)?);
    }
    Ok(specs)
}
