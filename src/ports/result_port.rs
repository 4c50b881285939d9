//! Screening result persistence port.

use crate::domain::error::ScreenerError;
use crate::domain::strategy::ScreeningResult;
use chrono::NaiveDate;

/// Sink for merged screening results.
///
/// Saving the same `(strategy_name, trade_date)` twice replaces the earlier
/// result.
pub trait ResultPort: Sync {
    fn save(
        &self,
        strategy_name: &str,
        trade_date: NaiveDate,
        result: &ScreeningResult,
    ) -> Result<(), ScreenerError>;
}
