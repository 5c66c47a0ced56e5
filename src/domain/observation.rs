//! Observations: a value for one period of one series, stamped with the moment it
//! became public.

use crate::domain::error::VintageError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single immutable record from the temporal store.
///
/// For a fixed `(series_id, period)` several observations may exist, one per
/// revision. A revision is a new record with a later `knowledge_time`; nothing is
/// ever updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub series_id: String,
    /// The date or period start the value describes (monthly data uses the first day).
    pub period: NaiveDate,
    pub value: f64,
    pub knowledge_time: NaiveDateTime,
    pub revision_index: u32,
}

impl Observation {
    /// A first release whose knowledge time is midnight of `known_on`.
    pub fn first_release(series_id: &str, period: NaiveDate, value: f64, known_on: NaiveDate) -> Self {
        Observation {
            series_id: series_id.to_string(),
            period,
            value,
            knowledge_time: start_of_day(known_on),
            revision_index: 0,
        }
    }

    /// Whether this observation was public at `bound` (inclusive).
    pub fn known_at(&self, bound: NaiveDateTime) -> bool {
        self.knowledge_time <= bound
    }
}

/// A `(period, value)` pair as returned by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: NaiveDate,
    pub value: f64,
}

impl From<&Observation> for SeriesPoint {
    fn from(obs: &Observation) -> Self {
        SeriesPoint {
            period: obs.period,
            value: obs.value,
        }
    }
}

/// Inclusive range of observation periods for a store query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRange {
    pub start: Option<NaiveDate>,
    pub end: NaiveDate,
}

impl PeriodRange {
    pub fn contains(&self, period: NaiveDate) -> bool {
        period <= self.end && self.start.is_none_or(|s| period >= s)
    }
}

/// What a store should do with an incoming observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPlan {
    /// Store it under this revision index.
    Insert(u32),
    /// Identical to the latest revision already stored; nothing to do.
    Duplicate,
}

/// Decide how to append `incoming` given the latest stored revision of the same
/// `(series_id, period)`. Revisions must carry strictly later knowledge times.
pub fn plan_append(
    latest: Option<&Observation>,
    incoming: &Observation,
) -> Result<AppendPlan, VintageError> {
    if !incoming.value.is_finite() {
        return Err(VintageError::InvalidObservation {
            series_id: incoming.series_id.clone(),
            reason: format!("non-finite value for period {}", incoming.period),
        });
    }
    let Some(latest) = latest else {
        return Ok(AppendPlan::Insert(0));
    };
    if latest.knowledge_time == incoming.knowledge_time && latest.value == incoming.value {
        return Ok(AppendPlan::Duplicate);
    }
    if incoming.knowledge_time <= latest.knowledge_time {
        return Err(VintageError::InvalidObservation {
            series_id: incoming.series_id.clone(),
            reason: format!(
                "revision of {} known at {} does not follow revision {} known at {}",
                incoming.period,
                incoming.knowledge_time,
                latest.revision_index,
                latest.knowledge_time
            ),
        });
    }
    Ok(AppendPlan::Insert(latest.revision_index + 1))
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Parse a knowledge timestamp from either `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
/// (a `T` separator is also accepted).
pub fn parse_knowledge_time(input: &str) -> Option<NaiveDateTime> {
    let trimmed = input.trim();
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| parse_period(trimmed).map(start_of_day))
}

/// Parse an observation period from `YYYY-MM-DD` or `YYYY-MM` (first of month).
pub fn parse_period(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d").ok())
}
