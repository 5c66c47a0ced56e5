//! Fixed target weights on every rebalance date.

use crate::domain::error::VintageError;
use crate::domain::loader::PitView;
use crate::domain::signal::{EmptySignal, Signal, SignalProducer};

pub struct ConstantWeights {
    name: String,
    weights: Signal,
    on_empty: EmptySignal,
}

impl ConstantWeights {
    pub fn new(name: &str, weights: Signal) -> Self {
        ConstantWeights {
            name: name.to_string(),
            weights,
            on_empty: EmptySignal::Hold,
        }
    }

    /// A producer that never asks for anything.
    pub fn flat(name: &str) -> Self {
        Self::new(name, Signal::new())
    }

    pub fn with_empty_policy(mut self, policy: EmptySignal) -> Self {
        self.on_empty = policy;
        self
    }
}

impl SignalProducer for ConstantWeights {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_signals(&self, _view: &PitView<'_>) -> Result<Signal, VintageError> {
        Ok(self.weights.clone())
    }

    fn empty_signal(&self) -> EmptySignal {
        self.on_empty
    }
}
