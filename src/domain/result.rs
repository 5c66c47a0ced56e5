//! The persisted record of one backtest run.

use crate::domain::engine::BacktestConfig;
use crate::domain::ledger::{EquityPoint, Ledger};
use crate::domain::metrics::{monthly_returns, PerformanceMetrics};
use crate::domain::schedule::RebalanceFrequency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Boundary record handed to reporting and persistence. Field names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rebalance_frequency: RebalanceFrequency,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub metrics: PerformanceMetrics,
    pub equity_curve: Vec<EquityPoint>,
    /// `YYYY-MM` -> fractional return.
    pub monthly_returns: BTreeMap<String, f64>,
    pub trade_count: usize,
}

impl BacktestResult {
    pub fn from_ledger(strategy_name: &str, config: &BacktestConfig, ledger: &Ledger) -> Self {
        let equity_curve = ledger.equity_curve().to_vec();
        let initial_capital = ledger.initial_capital();
        let metrics = PerformanceMetrics::compute(
            &equity_curve,
            ledger.trade_log(),
            initial_capital,
            config.rebalance_frequency,
        );
        BacktestResult {
            strategy_name: strategy_name.to_string(),
            start_date: config.start_date,
            end_date: config.end_date,
            rebalance_frequency: config.rebalance_frequency,
            initial_capital,
            final_equity: equity_curve
                .last()
                .map(|p| p.equity)
                .unwrap_or(initial_capital),
            metrics,
            monthly_returns: monthly_returns(&equity_curve),
            equity_curve,
            trade_count: ledger.trade_log().len(),
        }
    }
}
