//! Domain error types.

/// Top-level error type for the screener.
#[derive(Debug, thiserror::Error)]
pub enum ScreenerError {
    #[error("schema error: {reason}")]
    Schema { reason: String },

    #[error("no data for {code} on {date}")]
    DataUnavailable { code: String, date: String },

    #[error("insufficient history for {code}: have {bars} bars, need {minimum}")]
    InsufficientHistory {
        code: String,
        bars: usize,
        minimum: usize,
    },

    #[error("transient storage error: {reason}")]
    TransientStorage { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid date '{value}' (expected YYYYMMDD or YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScreenerError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScreenerError::TransientStorage { .. })
    }
}

impl From<&ScreenerError> for std::process::ExitCode {
    fn from(err: &ScreenerError) -> Self {
        let code: u8 = match err {
            ScreenerError::Io(_) => 1,
            ScreenerError::ConfigParse { .. }
            | ScreenerError::ConfigMissing { .. }
            | ScreenerError::ConfigInvalid { .. }
            | ScreenerError::InvalidDate { .. } => 2,
            ScreenerError::Database { .. }
            | ScreenerError::DatabaseQuery { .. }
            | ScreenerError::TransientStorage { .. } => 3,
            ScreenerError::Schema { .. } => 4,
            ScreenerError::DataUnavailable { .. } | ScreenerError::InsufficientHistory { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
