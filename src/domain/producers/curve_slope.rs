//! Yield-curve slope rotation.
//!
//! Above the threshold spread (long tenor minus short tenor) the steepener
//! instrument is held; at or below it the flattener is held instead, if configured.

use crate::domain::error::VintageError;
use crate::domain::loader::{Lookback, PitView};
use crate::domain::signal::{Signal, SignalProducer};
use tracing::debug;

pub struct CurveSlope {
    pub name: String,
    pub curve_id: String,
    pub short_tenor: String,
    pub long_tenor: String,
    pub steepener: String,
    pub flattener: Option<String>,
    pub threshold: f64,
    pub weight: f64,
    pub lookback: Lookback,
}

impl SignalProducer for CurveSlope {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_signals(&self, view: &PitView<'_>) -> Result<Signal, VintageError> {
        let curve = view.curve(
            &self.curve_id,
            &[self.short_tenor.as_str(), self.long_tenor.as_str()],
            self.lookback,
        )?;
        let Some(spread) = curve.spread(&self.short_tenor, &self.long_tenor) else {
            debug!(curve = %self.curve_id, as_of = %view.as_of_date(), "curve incomplete, no signal");
            return Ok(Signal::new());
        };

        let steep = spread > self.threshold;
        let mut signal = Signal::new().with(&self.steepener, if steep { self.weight } else { 0.0 });
        if let Some(flattener) = &self.flattener {
            signal.set(flattener, if steep { 0.0 } else { self.weight });
        }
        Ok(signal)
    }
}
