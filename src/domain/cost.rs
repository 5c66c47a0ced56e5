//! Transaction cost model.
//!
//! Costs are a pure function of the traded notional. The ledger only sees the
//! [`CostModel`] trait, so assumptions can change per instrument without touching
//! the accounting.

use std::collections::BTreeMap;

pub const BPS_PER_UNIT: f64 = 10_000.0;

/// `|trade_notional| * (cost_bps + slippage_bps) / 10_000`.
pub fn transaction_cost(trade_notional: f64, cost_bps: f64, slippage_bps: f64) -> f64 {
    trade_notional.abs() * (cost_bps + slippage_bps) / BPS_PER_UNIT
}

pub trait CostModel: Send + Sync {
    /// Monetary cost of trading `trade_notional` (signed) of `instrument_id`.
    fn cost(&self, instrument_id: &str, trade_notional: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpsCostModel {
    pub cost_bps: f64,
    pub slippage_bps: f64,
}

impl BpsCostModel {
    pub fn new(cost_bps: f64, slippage_bps: f64) -> Self {
        BpsCostModel {
            cost_bps,
            slippage_bps,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl CostModel for BpsCostModel {
    fn cost(&self, _instrument_id: &str, trade_notional: f64) -> f64 {
        transaction_cost(trade_notional, self.cost_bps, self.slippage_bps)
    }
}

/// Flat default with per-instrument overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct PerInstrumentCostModel {
    default: BpsCostModel,
    overrides: BTreeMap<String, BpsCostModel>,
}

impl PerInstrumentCostModel {
    pub fn new(default: BpsCostModel) -> Self {
        PerInstrumentCostModel {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, instrument_id: &str, rates: BpsCostModel) -> Self {
        self.overrides.insert(instrument_id.to_string(), rates);
        self
    }

    pub fn rates_for(&self, instrument_id: &str) -> BpsCostModel {
        self.overrides
            .get(instrument_id)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl CostModel for PerInstrumentCostModel {
    fn cost(&self, instrument_id: &str, trade_notional: f64) -> f64 {
        let rates = self.rates_for(instrument_id);
        transaction_cost(trade_notional, rates.cost_bps, rates.slippage_bps)
    }
}
