//! vintage: point-in-time research backtester for systematic macro strategies.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. Every analytical read goes through
//! [`domain::loader`], which only ever returns data knowable at the as-of date.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
