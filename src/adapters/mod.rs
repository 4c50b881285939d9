//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod log_notifier;
pub mod result_file_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
