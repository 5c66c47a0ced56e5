//! Portfolio ledger: cash, notional positions, equity curve and trade log for one run.
//!
//! Positions are held as signed currency notionals rather than share counts. After
//! every mutation `cash + sum(notional)` must equal the equity tracked independently
//! from mark-to-market P&L and costs; [`Ledger::verify`] checks it.

use crate::domain::cost::CostModel;
use crate::domain::error::VintageError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Trades smaller than this (in currency units) are treated as no trade.
pub const TRADE_EPSILON: f64 = 1e-6;

/// Relative tolerance for the equity bookkeeping check.
const EQUITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument_id: String,
    /// Signed currency amount; negative is short.
    pub notional: f64,
    /// Price when the position was opened (or flipped).
    pub entry_price: f64,
    /// Price at the most recent mark.
    pub last_price: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.notional > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.notional < 0.0
    }

    /// Price return since entry, signed by direction.
    pub fn unrealized_return(&self) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        self.notional.signum() * (self.last_price / self.entry_price - 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Open,
    Increase,
    Reduce,
    Close,
    Flip,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Open => "open",
            TradeKind::Increase => "increase",
            TradeKind::Reduce => "reduce",
            TradeKind::Close => "close",
            TradeKind::Flip => "flip",
        }
    }

    fn classify(current: f64, target: f64) -> Self {
        if current == 0.0 {
            TradeKind::Open
        } else if target == 0.0 {
            TradeKind::Close
        } else if current.signum() != target.signum() {
            TradeKind::Flip
        } else if target.abs() > current.abs() {
            TradeKind::Increase
        } else {
            TradeKind::Reduce
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub instrument_id: String,
    pub kind: TradeKind,
    /// Signed notional traded.
    pub notional: f64,
    pub price: f64,
    pub cost: f64,
    /// Set for reductions, closes and flips.
    pub realized_pnl: Option<f64>,
}

/// Scale weights down proportionally so that `sum(|w|) <= max_leverage`.
///
/// Returns the weights to trade and the scale factor applied, if any.
pub fn cap_leverage(
    weights: &BTreeMap<String, f64>,
    max_leverage: f64,
) -> (BTreeMap<String, f64>, Option<f64>) {
    let gross: f64 = weights.values().map(|w| w.abs()).sum();
    if gross <= max_leverage || gross == 0.0 {
        return (weights.clone(), None);
    }
    let scale = max_leverage / gross;
    let scaled = weights
        .iter()
        .map(|(id, w)| (id.clone(), w * scale))
        .collect();
    (scaled, Some(scale))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    cash: f64,
    initial_capital: f64,
    positions: BTreeMap<String, Position>,
    equity_curve: Vec<EquityPoint>,
    trade_log: Vec<TradeRecord>,
    tracked_equity: f64,
}

impl Ledger {
    pub fn new(initial_capital: f64) -> Self {
        Ledger {
            cash: initial_capital,
            initial_capital,
            positions: BTreeMap::new(),
            equity_curve: Vec::new(),
            trade_log: Vec::new(),
            tracked_equity: initial_capital,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, instrument_id: &str) -> Option<&Position> {
        self.positions.get(instrument_id)
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn trade_log(&self) -> &[TradeRecord] {
        &self.trade_log
    }

    /// Trades that realized P&L.
    pub fn closed_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.trade_log.iter().filter(|t| t.realized_pnl.is_some())
    }

    /// `cash + sum(notional)`.
    pub fn total_equity(&self) -> f64 {
        self.cash + self.positions.values().map(|p| p.notional).sum::<f64>()
    }

    pub fn tracked_equity(&self) -> f64 {
        self.tracked_equity
    }

    pub fn gross_exposure(&self) -> f64 {
        self.positions.values().map(|p| p.notional.abs()).sum()
    }

    /// Current notional as a fraction of total equity, per instrument.
    pub fn weights(&self) -> BTreeMap<String, f64> {
        let equity = self.total_equity();
        if equity == 0.0 {
            return BTreeMap::new();
        }
        self.positions
            .iter()
            .map(|(id, p)| (id.clone(), p.notional / equity))
            .collect()
    }

    /// Rescale each priced position by `new_price / last_price`. Cash is untouched.
    /// Positions without a usable price keep their notional. Returns the P&L.
    pub fn mark_to_market(&mut self, prices: &BTreeMap<String, f64>) -> f64 {
        let mut pnl = 0.0;
        for position in self.positions.values_mut() {
            let Some(&price) = prices.get(&position.instrument_id) else {
                continue;
            };
            if !price.is_finite() || price <= 0.0 || position.last_price <= 0.0 {
                continue;
            }
            let marked = position.notional * (price / position.last_price);
            pnl += marked - position.notional;
            position.notional = marked;
            position.last_price = price;
        }
        self.tracked_equity += pnl;
        pnl
    }

    /// Trade toward `target_weights` (fractions of pre-trade equity).
    ///
    /// Instruments absent from `target_weights` are left alone; a weight of zero
    /// closes. Weights are capped to `max_leverage` before trading. Every target must
    /// be priced in `prices` or already held (its last mark is used).
    pub fn rebalance(
        &mut self,
        date: NaiveDate,
        target_weights: &BTreeMap<String, f64>,
        prices: &BTreeMap<String, f64>,
        max_leverage: f64,
        costs: &dyn CostModel,
    ) -> Result<Vec<TradeRecord>, VintageError> {
        let (weights, scale) = cap_leverage(target_weights, max_leverage);
        if let Some(scale) = scale {
            debug!(%date, scale, max_leverage, "target weights scaled to leverage cap");
        }

        let equity = self.total_equity();
        let mut applied = Vec::new();

        for (instrument_id, weight) in &weights {
            let current = self.positions.get(instrument_id);
            let price = match (prices.get(instrument_id), current) {
                (Some(&p), _) => p,
                (None, Some(pos)) => pos.last_price,
                (None, None) => {
                    return Err(VintageError::MissingPrice {
                        instrument_id: instrument_id.clone(),
                    })
                }
            };

            let current_notional = current.map_or(0.0, |p| p.notional);
            let mut target = equity * weight;
            if target.abs() < TRADE_EPSILON {
                target = 0.0;
            }
            let trade = target - current_notional;
            if trade.abs() < TRADE_EPSILON {
                continue;
            }

            let kind = TradeKind::classify(current_notional, target);
            let cost = costs.cost(instrument_id, trade);
            self.cash -= trade + cost;
            self.tracked_equity -= cost;

            let realized_pnl = current.and_then(|pos| {
                let closed = match kind {
                    TradeKind::Reduce => trade.abs(),
                    TradeKind::Close | TradeKind::Flip => pos.notional.abs(),
                    TradeKind::Open | TradeKind::Increase => return None,
                };
                // `closed` is at the current mark, so the gain is its share since entry.
                let gain_fraction = if price > 0.0 && pos.entry_price > 0.0 {
                    1.0 - pos.entry_price / price
                } else {
                    0.0
                };
                Some(pos.notional.signum() * gain_fraction * closed - cost)
            });

            match kind {
                TradeKind::Close => {
                    self.positions.remove(instrument_id);
                }
                TradeKind::Open | TradeKind::Flip => {
                    self.positions.insert(
                        instrument_id.clone(),
                        Position {
                            instrument_id: instrument_id.clone(),
                            notional: target,
                            entry_price: price,
                            last_price: price,
                        },
                    );
                }
                TradeKind::Increase | TradeKind::Reduce => {
                    if let Some(pos) = self.positions.get_mut(instrument_id) {
                        pos.notional += trade;
                        pos.last_price = price;
                    }
                }
            }

            let record = TradeRecord {
                date,
                instrument_id: instrument_id.clone(),
                kind,
                notional: trade,
                price,
                cost,
                realized_pnl,
            };
            debug!(
                %date,
                instrument = %record.instrument_id,
                kind = record.kind.as_str(),
                notional = record.notional,
                cost = record.cost,
                "trade applied"
            );
            applied.push(record.clone());
            self.trade_log.push(record);
        }

        Ok(applied)
    }

    /// Close every open position.
    pub fn liquidate(
        &mut self,
        date: NaiveDate,
        prices: &BTreeMap<String, f64>,
        costs: &dyn CostModel,
    ) -> Result<Vec<TradeRecord>, VintageError> {
        let targets: BTreeMap<String, f64> =
            self.positions.keys().map(|id| (id.clone(), 0.0)).collect();
        self.rebalance(date, &targets, prices, f64::INFINITY, costs)
    }

    /// Append today's equity. Dates must be strictly increasing.
    pub fn record_equity(&mut self, date: NaiveDate) -> Result<EquityPoint, VintageError> {
        if let Some(last) = self.equity_curve.last() {
            if date <= last.date {
                return Err(VintageError::EquityOrder {
                    date,
                    last: last.date,
                });
            }
        }
        let point = EquityPoint {
            date,
            equity: self.total_equity(),
        };
        self.equity_curve.push(point);
        Ok(point)
    }

    /// Check `cash + sum(notional)` against the independently tracked equity.
    pub fn verify(&self, date: NaiveDate) -> Result<(), VintageError> {
        let actual = self.total_equity();
        let tracked = self.tracked_equity;
        let scale = actual
            .abs()
            .max(tracked.abs())
            .max(self.gross_exposure())
            .max(1.0);
        if (actual - tracked).abs() > EQUITY_TOLERANCE * scale || !actual.is_finite() {
            return Err(VintageError::LedgerInvariant {
                date,
                tracked,
                actual,
            });
        }
        Ok(())
    }
}
