//! Independent runs in parallel: parameter sweeps and walk-forward windows.
//!
//! Each job builds its own engine and ledger; only the store is shared, read-only.

use crate::domain::cost::CostModel;
use crate::domain::engine::{BacktestConfig, BacktestEngine};
use crate::domain::error::VintageError;
use crate::domain::result::BacktestResult;
use crate::domain::signal::SignalProducer;
use crate::ports::temporal_store::TemporalStore;
use chrono::{Duration, Months, NaiveDate};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct SweepJob {
    pub label: String,
    pub config: BacktestConfig,
    pub producer: Arc<dyn SignalProducer>,
    pub cost_model: Option<Arc<dyn CostModel>>,
}

impl SweepJob {
    pub fn new(label: &str, config: BacktestConfig, producer: Arc<dyn SignalProducer>) -> Self {
        SweepJob {
            label: label.to_string(),
            config,
            producer,
            cost_model: None,
        }
    }

    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = Some(cost_model);
        self
    }

    fn run(&self, store: &dyn TemporalStore) -> Result<BacktestResult, VintageError> {
        let mut engine = BacktestEngine::new(&self.config, store);
        if let Some(cost_model) = &self.cost_model {
            engine = engine.with_cost_model(Arc::clone(cost_model));
        }
        engine.run(self.producer.as_ref())
    }
}

#[derive(Debug)]
pub struct SweepOutcome {
    pub label: String,
    pub result: Result<BacktestResult, VintageError>,
}

/// Run every job on the rayon pool. Outcomes come back in job order; a failed job
/// does not stop the others.
pub fn run_parallel(store: &dyn TemporalStore, jobs: &[SweepJob]) -> Vec<SweepOutcome> {
    info!(jobs = jobs.len(), "parallel runs started");
    jobs.par_iter()
        .map(|job| SweepOutcome {
            label: job.label.clone(),
            result: job.run(store),
        })
        .collect()
}

/// Rolling `[start, end]` windows of `window_months`, advanced by `step_months`, that
/// fit entirely inside `[start, end]`.
pub fn walk_forward_windows(
    start: NaiveDate,
    end: NaiveDate,
    window_months: u32,
    step_months: u32,
) -> Result<Vec<(NaiveDate, NaiveDate)>, VintageError> {
    if window_months == 0 {
        return Err(VintageError::config_invalid(
            "walk_forward",
            "window_months",
            "must be at least 1",
        ));
    }
    if step_months == 0 {
        return Err(VintageError::config_invalid(
            "walk_forward",
            "step_months",
            "must be at least 1",
        ));
    }

    let mut windows = Vec::new();
    let mut offset = 0u32;
    while let Some(window_start) = start.checked_add_months(Months::new(offset)) {
        let Some(window_end) = window_start
            .checked_add_months(Months::new(window_months))
            .map(|d| d - Duration::days(1))
        else {
            break;
        };
        if window_end > end {
            break;
        }
        windows.push((window_start, window_end));
        offset += step_months;
    }
    Ok(windows)
}
