//! Bounded exponential backoff for transient storage failures.

use crate::domain::error::ScreenerError;
use crate::ports::config_port::ConfigPort;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,
    /// Sleep after the first failed attempt.
    pub backoff_ms_initial: u64,
    /// Scaling factor applied to the sleep after each further failure.
    pub backoff_multiplier: u32,
    pub backoff_ms_max: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms_initial: 100,
            backoff_multiplier: 2,
            backoff_ms_max: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Read the `[retry]` section, falling back to defaults per key.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        Self {
            max_attempts: config
                .get_int("retry", "max_attempts", d.max_attempts as i64)
                .clamp(1, u32::MAX as i64) as u32,
            backoff_ms_initial: config
                .get_int("retry", "backoff_ms_initial", d.backoff_ms_initial as i64)
                .max(0) as u64,
            backoff_multiplier: config
                .get_int("retry", "backoff_multiplier", d.backoff_multiplier as i64)
                .clamp(1, u32::MAX as i64) as u32,
            backoff_ms_max: config
                .get_int("retry", "backoff_ms_max", d.backoff_ms_max as i64)
                .max(0) as u64,
        }
    }

    /// Sleep before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let mut current = self.backoff_ms_initial.min(self.backoff_ms_max);
        for _ in 1..attempt {
            current = current
                .saturating_mul(self.backoff_multiplier as u64)
                .min(self.backoff_ms_max);
        }
        current
    }

    /// Run `op`, retrying only errors that report `is_transient`.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, ScreenerError>
    where
        F: FnMut() -> Result<T, ScreenerError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let sleep_ms = self.backoff_ms(attempt);
                    warn!(
                        what,
                        attempt,
                        max_attempts,
                        sleep_ms,
                        error = %e,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(Duration::from_millis(sleep_ms));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_ms_initial: 1,
            backoff_multiplier: 2,
            backoff_ms_max: 4,
        }
    }

    fn busy() -> ScreenerError {
        ScreenerError::TransientStorage {
            reason: "database is locked".into(),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            backoff_ms_initial: 100,
            backoff_multiplier: 3,
            backoff_ms_max: 1_000,
        };
        assert_eq!(policy.backoff_ms(1), 100);
        assert_eq!(policy.backoff_ms(2), 300);
        assert_eq!(policy.backoff_ms(3), 900);
        assert_eq!(policy.backoff_ms(4), 1_000);
    }

    #[test]
    fn retries_transient_until_success() {
        let calls = Cell::new(0);
        let out = fast().run("save", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(busy()) } else { Ok(42) }
        });
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let out: Result<(), _> = fast().run("save", || {
            calls.set(calls.get() + 1);
            Err(busy())
        });
        assert!(matches!(out, Err(ScreenerError::TransientStorage { .. })));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let out: Result<(), _> = fast().run("save", || {
            calls.set(calls.get() + 1);
            Err(ScreenerError::DatabaseQuery {
                reason: "no such table".into(),
            })
        });
        assert!(out.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn none_runs_once() {
        let calls = Cell::new(0);
        let _: Result<(), _> = RetryPolicy::none().run("save", || {
            calls.set(calls.get() + 1);
            Err(busy())
        });
        assert_eq!(calls.get(), 1);
    }
}
