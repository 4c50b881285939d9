//! Market data access port.

use crate::domain::error::ScreenerError;
use crate::domain::ohlcv::HistoricalBar;
use crate::domain::tick::IntradayTick;
use chrono::NaiveDate;

/// Read-only market data source shared by every batch worker.
pub trait DataPort: Sync {
    /// Daily history for `code` in `[start_date, end_date]`. An empty vector
    /// means no data.
    fn fetch_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<HistoricalBar>, ScreenerError>;

    /// Intraday ticks for `code` on `date`, in any order.
    fn fetch_ticks(&self, code: &str, date: NaiveDate) -> Result<Vec<IntradayTick>, ScreenerError>;

    fn list_symbols(&self) -> Result<Vec<String>, ScreenerError>;

    /// First date, last date and bar count of a code's history.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, ScreenerError>;
}
