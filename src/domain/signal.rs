//! Signal producer contract and registry.

use crate::domain::error::VintageError;
use crate::domain::loader::PitView;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Target weights (signed fractions of equity) for one as-of date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    weights: BTreeMap<String, f64>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, instrument_id: &str, weight: f64) -> Self {
        self.weights.insert(instrument_id.to_string(), weight);
        self
    }

    pub fn set(&mut self, instrument_id: &str, weight: f64) {
        self.weights.insert(instrument_id.to_string(), weight);
    }

    pub fn weight(&self, instrument_id: &str) -> Option<f64> {
        self.weights.get(instrument_id).copied()
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn into_weights(self) -> BTreeMap<String, f64> {
        self.weights
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// `sum(|w|)`.
    pub fn gross(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }
}

impl FromIterator<(String, f64)> for Signal {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Signal {
            weights: iter.into_iter().collect(),
        }
    }
}

/// What an empty signal means for a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptySignal {
    /// Keep every position as it is.
    #[default]
    Hold,
    /// Close every position.
    Liquidate,
}

impl EmptySignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmptySignal::Hold => "hold",
            EmptySignal::Liquidate => "liquidate",
        }
    }
}

/// A strategy or analytical agent that turns point-in-time data into target weights.
///
/// Producers read data only through the [`PitView`] they are handed, which is bound
/// to the rebalance date. A non-empty signal is partial: instruments it omits keep
/// their positions and an explicit weight of zero closes.
pub trait SignalProducer: Send + Sync {
    fn name(&self) -> &str;

    fn generate_signals(&self, view: &PitView<'_>) -> Result<Signal, VintageError>;

    fn empty_signal(&self) -> EmptySignal {
        EmptySignal::Hold
    }
}

/// Producers by name, built by the caller and passed explicitly.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: BTreeMap<String, Arc<dyn SignalProducer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under `producer.name()`, returning any producer it replaced.
    pub fn register(
        &mut self,
        producer: Arc<dyn SignalProducer>,
    ) -> Option<Arc<dyn SignalProducer>> {
        self.producers.insert(producer.name().to_string(), producer)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SignalProducer>, VintageError> {
        self.producers
            .get(name)
            .cloned()
            .ok_or_else(|| VintageError::UnknownProducer {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.producers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
