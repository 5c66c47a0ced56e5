//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_report;
pub mod memory_store;
#[cfg(feature = "sqlite")]
pub mod sqlite_store;
pub mod text_report;
