//! Temporal store port: durable, append-only storage of time-stamped observations.

use crate::domain::error::VintageError;
use crate::domain::observation::{Observation, PeriodRange};
use chrono::{NaiveDate, NaiveDateTime};

/// Summary of what a store holds for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRange {
    pub first_period: NaiveDate,
    pub last_period: NaiveDate,
    pub observations: usize,
    pub revisions: usize,
}

/// Read/append access to the temporal store.
///
/// Implementations must be safe for concurrent reads, and `query` must never
/// return an observation whose `knowledge_time` exceeds `max_knowledge_time`.
pub trait TemporalStore: Send + Sync {
    fn query(
        &self,
        series_id: &str,
        max_knowledge_time: NaiveDateTime,
        periods: PeriodRange,
    ) -> Result<Vec<Observation>, VintageError>;

    /// Append a release or revision. The store assigns `revision_index`; the
    /// incoming value is ignored.
    fn append(&self, observation: Observation) -> Result<Observation, VintageError>;

    fn list_series(&self) -> Result<Vec<String>, VintageError>;

    fn series_range(&self, series_id: &str) -> Result<Option<SeriesRange>, VintageError>;
}
