//! CSV import of observations and export of equity curves and trade logs.
//!
//! Observation files carry a header with `series_id`, `period`, `value` and
//! `knowledge_time` columns in any order. Periods accept `YYYY-MM-DD` or `YYYY-MM`;
//! knowledge times accept a date or `YYYY-MM-DD HH:MM:SS`.

use crate::domain::error::VintageError;
use crate::domain::ledger::{EquityPoint, TradeRecord};
use crate::domain::observation::{parse_knowledge_time, parse_period, Observation};
use std::path::Path;

const COLUMNS: [&str; 4] = ["series_id", "period", "value", "knowledge_time"];

fn invalid(source: &str, line: u64, reason: String) -> VintageError {
    VintageError::InvalidObservation {
        series_id: format!("{source}:{line}"),
        reason,
    }
}

pub fn read_observations(path: &Path) -> Result<Vec<Observation>, VintageError> {
    let source = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = rdr.headers()?.clone();
    let mut index = [0usize; 4];
    for (slot, name) in index.iter_mut().zip(COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| invalid(&source, 1, format!("missing column '{name}'")))?;
    }
    let [series_col, period_col, value_col, known_col] = index;

    let mut observations = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        let field = |col: usize| record.get(col).unwrap_or("");

        let series_id = field(series_col);
        if series_id.is_empty() {
            return Err(invalid(&source, line, "empty series_id".into()));
        }
        let period = parse_period(field(period_col))
            .ok_or_else(|| invalid(&source, line, format!("invalid period '{}'", field(period_col))))?;
        let value: f64 = field(value_col)
            .parse()
            .map_err(|e| invalid(&source, line, format!("invalid value '{}': {e}", field(value_col))))?;
        let knowledge_time = parse_knowledge_time(field(known_col)).ok_or_else(|| {
            invalid(
                &source,
                line,
                format!("invalid knowledge_time '{}'", field(known_col)),
            )
        })?;

        observations.push(Observation {
            series_id: series_id.to_string(),
            period,
            value,
            knowledge_time,
            revision_index: 0,
        });
    }

    // Revisions must reach the store in knowledge order.
    observations.sort_by(|a, b| {
        a.series_id
            .cmp(&b.series_id)
            .then(a.period.cmp(&b.period))
            .then(a.knowledge_time.cmp(&b.knowledge_time))
    });
    Ok(observations)
}

/// `date,equity` rows for external chart renderers.
pub fn write_equity_curve(curve: &[EquityPoint], path: &Path) -> Result<(), VintageError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for point in curve {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_trade_log(trades: &[TradeRecord], path: &Path) -> Result<(), VintageError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for trade in trades {
        wtr.serialize(trade)?;
    }
    wtr.flush()?;
    Ok(())
}
