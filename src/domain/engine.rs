//! Backtest engine: the replay loop.
//!
//! For each rebalance date, in order: ask the producer for a signal through a view
//! bound to that date, price the book, mark to market, rebalance, record equity.
//! Only the engine advances simulated time. A run owns its ledger, so an aborted run
//! leaves nothing behind.

use crate::domain::cost::{BpsCostModel, CostModel};
use crate::domain::error::VintageError;
use crate::domain::ledger::Ledger;
use crate::domain::loader::{AsOf, PointInTimeLoader};
use crate::domain::result::BacktestResult;
use crate::domain::schedule::{rebalance_dates, RebalanceFrequency};
use crate::domain::signal::{EmptySignal, ProducerRegistry, SignalProducer};
use crate::ports::temporal_store::TemporalStore;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_TRANSACTION_COST_BPS: f64 = 5.0;
pub const DEFAULT_SLIPPAGE_BPS: f64 = 2.0;
pub const DEFAULT_MAX_LEVERAGE: f64 = 1.0;

/// Immutable parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub rebalance_frequency: RebalanceFrequency,
    pub transaction_cost_bps: f64,
    pub slippage_bps: f64,
    pub max_leverage: f64,
}

impl BacktestConfig {
    /// Monthly rebalancing with default costs and leverage.
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_capital: f64) -> Self {
        BacktestConfig {
            start_date,
            end_date,
            initial_capital,
            rebalance_frequency: RebalanceFrequency::Monthly,
            transaction_cost_bps: DEFAULT_TRANSACTION_COST_BPS,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            max_leverage: DEFAULT_MAX_LEVERAGE,
        }
    }

    pub fn with_frequency(self, rebalance_frequency: RebalanceFrequency) -> Self {
        BacktestConfig {
            rebalance_frequency,
            ..self
        }
    }

    pub fn with_costs(self, transaction_cost_bps: f64, slippage_bps: f64) -> Self {
        BacktestConfig {
            transaction_cost_bps,
            slippage_bps,
            ..self
        }
    }

    pub fn with_max_leverage(self, max_leverage: f64) -> Self {
        BacktestConfig {
            max_leverage,
            ..self
        }
    }

    pub fn rebalance_dates(&self) -> Vec<NaiveDate> {
        rebalance_dates(self.start_date, self.end_date, self.rebalance_frequency)
    }

    pub fn cost_model(&self) -> BpsCostModel {
        BpsCostModel::new(self.transaction_cost_bps, self.slippage_bps)
    }
}

struct RunState {
    ledger: Ledger,
    last_prices: BTreeMap<String, (NaiveDate, f64)>,
}

pub struct BacktestEngine<'a> {
    config: &'a BacktestConfig,
    loader: PointInTimeLoader<'a>,
    cost_model: Arc<dyn CostModel>,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(config: &'a BacktestConfig, store: &'a dyn TemporalStore) -> Self {
        BacktestEngine {
            config,
            loader: PointInTimeLoader::new(store),
            cost_model: Arc::new(config.cost_model()),
        }
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        self.config
    }

    pub fn run(&self, producer: &dyn SignalProducer) -> Result<BacktestResult, VintageError> {
        let ledger = self.simulate(producer)?;
        Ok(BacktestResult::from_ledger(producer.name(), self.config, &ledger))
    }

    /// Look up `name` in `registry` and run it.
    pub fn run_named(
        &self,
        registry: &ProducerRegistry,
        name: &str,
    ) -> Result<BacktestResult, VintageError> {
        let producer = registry.get(name)?;
        self.run(producer.as_ref())
    }

    /// Replay every rebalance date and return the final ledger.
    pub fn simulate(&self, producer: &dyn SignalProducer) -> Result<Ledger, VintageError> {
        let dates = self.config.rebalance_dates();
        info!(
            strategy = producer.name(),
            start = %self.config.start_date,
            end = %self.config.end_date,
            frequency = %self.config.rebalance_frequency,
            rebalance_dates = dates.len(),
            "backtest started"
        );

        let mut state = RunState {
            ledger: Ledger::new(self.config.initial_capital),
            last_prices: BTreeMap::new(),
        };
        for date in dates {
            self.step(date, producer, &mut state)?;
        }

        info!(
            strategy = producer.name(),
            final_equity = state.ledger.total_equity(),
            trades = state.ledger.trade_log().len(),
            "backtest finished"
        );
        Ok(state.ledger)
    }

    fn step(
        &self,
        date: NaiveDate,
        producer: &dyn SignalProducer,
        state: &mut RunState,
    ) -> Result<(), VintageError> {
        let as_of = AsOf::end_of_day(date);

        let signal = producer.generate_signals(&self.loader.view(as_of))?;
        if let Some((instrument, weight)) = signal.weights().iter().find(|(_, w)| !w.is_finite()) {
            return Err(VintageError::Producer {
                name: producer.name().to_string(),
                reason: format!("non-finite weight {weight} for {instrument} on {date}"),
            });
        }

        let targets: BTreeMap<String, f64> = if signal.is_empty() {
            let policy = producer.empty_signal();
            debug!(%date, policy = policy.as_str(), "empty signal");
            match policy {
                EmptySignal::Hold => BTreeMap::new(),
                EmptySignal::Liquidate => state
                    .ledger
                    .positions()
                    .keys()
                    .map(|id| (id.clone(), 0.0))
                    .collect(),
            }
        } else {
            signal.into_weights()
        };

        let instruments: BTreeSet<String> = state
            .ledger
            .positions()
            .keys()
            .chain(targets.keys())
            .cloned()
            .collect();
        let mut prices = BTreeMap::new();
        for instrument in &instruments {
            if let Some(price) = self.price_on(instrument, date, as_of, &mut state.last_prices)? {
                prices.insert(instrument.clone(), price);
            }
        }

        state.ledger.mark_to_market(&prices);
        state.ledger.verify(date)?;

        let tradable: BTreeMap<String, f64> = targets
            .into_iter()
            .filter(|(instrument, _)| {
                let priced = prices.contains_key(instrument);
                if !priced {
                    warn!(instrument = %instrument, %date, "no price known yet, target skipped");
                }
                priced
            })
            .collect();

        state.ledger.rebalance(
            date,
            &tradable,
            &prices,
            self.config.max_leverage,
            self.cost_model.as_ref(),
        )?;
        state.ledger.verify(date)?;

        let point = state.ledger.record_equity(date)?;
        debug!(%date, equity = point.equity, cash = state.ledger.cash(), "equity recorded");
        Ok(())
    }

    /// Price with period equal to `date`, else the last price this run has seen.
    fn price_on(
        &self,
        instrument: &str,
        date: NaiveDate,
        as_of: AsOf,
        last_prices: &mut BTreeMap<String, (NaiveDate, f64)>,
    ) -> Result<Option<f64>, VintageError> {
        match self.loader.get_value(instrument, as_of, date)? {
            Some(price) if price.is_finite() && price > 0.0 => {
                last_prices.insert(instrument.to_string(), (date, price));
                return Ok(Some(price));
            }
            Some(price) => {
                warn!(instrument, %date, price, "non-positive price ignored");
            }
            None => {}
        }

        Ok(last_prices.get(instrument).map(|&(priced_on, price)| {
            warn!(instrument, %date, %priced_on, price, "no price on rebalance date, using last known");
            price
        }))
    }
}
