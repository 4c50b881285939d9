//! Core domain types and screening logic.

pub mod ohlcv;
pub mod tick;
pub mod trade_date;
pub mod aggregator;
pub mod indicator;
pub mod indicator_helpers;
pub mod frame;
pub mod fusion;
pub mod strategy;
pub mod retry;
pub mod batch;
pub mod scheduler;
pub mod universe;
pub mod config_validation;
pub mod error;
