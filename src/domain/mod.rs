//! Core domain types and logic.

pub mod config_validation;
pub mod cost;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod metrics;
pub mod observation;
pub mod producers;
pub mod result;
pub mod schedule;
pub mod signal;
pub mod sweep;
