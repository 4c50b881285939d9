//! Run summary notification port.

use crate::domain::error::ScreenerError;

pub trait NotifyPort: Sync {
    /// Deliver a human-readable run summary. Callers log failures and carry on.
    fn notify(&self, message: &str) -> Result<(), ScreenerError>;
}
