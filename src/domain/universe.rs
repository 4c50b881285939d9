//! Screening universe: code list parsing and resolution.
//!
//! Codes are `NNNNNN.XX` exchange-qualified A-share codes. A bare six-digit
//! code gets its suffix from the leading digit.

use crate::domain::error::ScreenerError;
use crate::ports::data_port::DataPort;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),

    #[error("invalid code: {0}")]
    InvalidCode(String),

    #[error("universe is empty")]
    Empty,
}

const EXCHANGES: [&str; 3] = ["SH", "SZ", "BJ"];

/// Exchange suffix implied by a bare six-digit code.
fn infer_exchange(digits: &str) -> Option<&'static str> {
    match digits.as_bytes().first()? {
        b'6' | b'9' => Some("SH"),
        b'0' | b'2' | b'3' => Some("SZ"),
        b'4' | b'8' => Some("BJ"),
        _ => None,
    }
}

/// Uppercase a code and add the exchange suffix if it is missing.
pub fn normalize_code(raw: &str) -> Result<String, UniverseError> {
    let upper = raw.trim().to_uppercase();
    let (digits, exchange) = match upper.split_once('.') {
        Some((d, e)) => (d.to_string(), e.to_string()),
        None => {
            let exchange = infer_exchange(&upper).ok_or_else(|| UniverseError::InvalidCode(upper.clone()))?;
            (upper.clone(), exchange.to_string())
        }
    };
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UniverseError::InvalidCode(upper));
    }
    if !EXCHANGES.contains(&exchange.as_str()) {
        return Err(UniverseError::InvalidCode(upper));
    }
    Ok(format!("{digits}.{exchange}"))
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = normalize_code(trimmed)?;
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// The explicit code list when one is given, otherwise every symbol the
/// data source knows about.
pub fn resolve_universe(
    data_port: &dyn DataPort,
    codes: Option<&str>,
) -> Result<Vec<String>, ScreenerError> {
    let codes = match codes {
        Some(list) => parse_codes(list).map_err(|e| ScreenerError::ConfigInvalid {
            section: "screening".to_string(),
            key: "codes".to_string(),
            reason: e.to_string(),
        })?,
        None => {
            let mut all = data_port.list_symbols()?;
            all.sort();
            all.dedup();
            all
        }
    };
    if codes.is_empty() {
        return Err(ScreenerError::ConfigInvalid {
            section: "screening".to_string(),
            key: "codes".to_string(),
            reason: UniverseError::Empty.to_string(),
        });
    }
    info!(symbols = codes.len(), "universe resolved");
    Ok(codes)
}
