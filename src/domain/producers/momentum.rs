//! Time-series momentum: long instruments whose price rose over the lookback, short
//! those that fell.

use crate::domain::error::VintageError;
use crate::domain::loader::{Lookback, PitView};
use crate::domain::signal::{Signal, SignalProducer};
use tracing::debug;

pub struct TimeSeriesMomentum {
    name: String,
    instruments: Vec<String>,
    lookback_months: u32,
    gross_weight: f64,
}

impl TimeSeriesMomentum {
    pub fn new(name: &str, instruments: Vec<String>, lookback_months: u32, gross_weight: f64) -> Self {
        TimeSeriesMomentum {
            name: name.to_string(),
            instruments,
            lookback_months,
            gross_weight,
        }
    }

    fn per_instrument_weight(&self) -> f64 {
        if self.instruments.is_empty() {
            0.0
        } else {
            self.gross_weight / self.instruments.len() as f64
        }
    }
}

impl SignalProducer for TimeSeriesMomentum {
    fn name(&self) -> &str {
        &self.name
    }

    /// Instruments with fewer than two prices in the lookback are left out of the
    /// signal, so their positions are held.
    fn generate_signals(&self, view: &PitView<'_>) -> Result<Signal, VintageError> {
        let per = self.per_instrument_weight();
        let mut signal = Signal::new();

        for instrument in &self.instruments {
            let window = view.series(instrument, Lookback::Months(self.lookback_months))?;
            let (Some(first), Some(last)) = (window.first(), window.last()) else {
                continue;
            };
            if window.len() < 2 || first.value <= 0.0 {
                debug!(instrument, as_of = %view.as_of_date(), "insufficient history for momentum");
                continue;
            }
            let trailing = last.value / first.value - 1.0;
            let weight = if trailing > 0.0 {
                per
            } else if trailing < 0.0 {
                -per
            } else {
                0.0
            };
            signal.set(instrument, weight);
        }

        Ok(signal)
    }
}
