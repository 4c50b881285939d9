//! Notifier that reports run summaries through the log.

use crate::domain::error::ScreenerError;
use crate::ports::notify_port::NotifyPort;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotifyPort for LogNotifier {
    fn notify(&self, message: &str) -> Result<(), ScreenerError> {
        info!(target: "kline_screener::notify", "{message}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_fails() {
        assert!(LogNotifier.notify("momentum 2024-03-15: 0 matched of 0 symbols").is_ok());
    }
}
