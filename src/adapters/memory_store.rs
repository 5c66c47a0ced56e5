//! In-memory temporal store.

use crate::domain::error::VintageError;
use crate::domain::observation::{plan_append, AppendPlan, Observation, PeriodRange};
use crate::ports::temporal_store::{SeriesRange, TemporalStore};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type SeriesMap = BTreeMap<String, BTreeMap<NaiveDate, Vec<Observation>>>;

/// Observations keyed by series then period; revisions kept in append order.
#[derive(Default)]
pub struct InMemoryStore {
    series: RwLock<SeriesMap>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(
        observations: impl IntoIterator<Item = Observation>,
    ) -> Result<Self, VintageError> {
        let store = Self::new();
        for obs in observations {
            store.append(obs)?;
        }
        Ok(store)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, SeriesMap>, VintageError> {
        self.series.read().map_err(|_| VintageError::Store {
            reason: "in-memory store lock poisoned".into(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SeriesMap>, VintageError> {
        self.series.write().map_err(|_| VintageError::Store {
            reason: "in-memory store lock poisoned".into(),
        })
    }
}

impl TemporalStore for InMemoryStore {
    fn query(
        &self,
        series_id: &str,
        max_knowledge_time: NaiveDateTime,
        periods: PeriodRange,
    ) -> Result<Vec<Observation>, VintageError> {
        let guard = self.read()?;
        let Some(by_period) = guard.get(series_id) else {
            return Ok(Vec::new());
        };
        let lower = periods.start.unwrap_or(NaiveDate::MIN);
        if lower > periods.end {
            return Ok(Vec::new());
        }
        Ok(by_period
            .range(lower..=periods.end)
            .flat_map(|(_, revisions)| revisions.iter())
            .filter(|obs| obs.knowledge_time <= max_knowledge_time)
            .cloned()
            .collect())
    }

    fn append(&self, observation: Observation) -> Result<Observation, VintageError> {
        let mut guard = self.write()?;
        let latest = guard
            .get(&observation.series_id)
            .and_then(|by_period| by_period.get(&observation.period))
            .and_then(|revisions| revisions.last());

        match plan_append(latest, &observation)? {
            AppendPlan::Duplicate => Ok(latest.cloned().unwrap_or(observation)),
            AppendPlan::Insert(revision_index) => {
                let stored = Observation {
                    revision_index,
                    ..observation
                };
                guard
                    .entry(stored.series_id.clone())
                    .or_default()
                    .entry(stored.period)
                    .or_default()
                    .push(stored.clone());
                Ok(stored)
            }
        }
    }

    fn list_series(&self) -> Result<Vec<String>, VintageError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn series_range(&self, series_id: &str) -> Result<Option<SeriesRange>, VintageError> {
        let guard = self.read()?;
        let Some(by_period) = guard.get(series_id) else {
            return Ok(None);
        };
        let (Some((first, _)), Some((last, _))) =
            (by_period.first_key_value(), by_period.last_key_value())
        else {
            return Ok(None);
        };
        Ok(Some(SeriesRange {
            first_period: *first,
            last_period: *last,
            observations: by_period.len(),
            revisions: by_period.values().map(Vec::len).sum(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observation::start_of_day;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn all_periods(end: NaiveDate) -> PeriodRange {
        PeriodRange { start: None, end }
    }

    #[test]
    fn append_assigns_revision_indices() {
        let store = InMemoryStore::new();
        let a = store
            .append(Observation::first_release("X", date(2024, 3, 1), 100.0, date(2024, 4, 5)))
            .unwrap();
        let b = store
            .append(Observation::first_release("X", date(2024, 3, 1), 98.0, date(2024, 5, 10)))
            .unwrap();
        assert_eq!(a.revision_index, 0);
        assert_eq!(b.revision_index, 1);
    }

    #[test]
    fn duplicate_append_is_idempotent() {
        let store = InMemoryStore::new();
        let obs = Observation::first_release("X", date(2024, 3, 1), 100.0, date(2024, 4, 5));
        store.append(obs.clone()).unwrap();
        store.append(obs).unwrap();
        let range = store.series_range("X").unwrap().unwrap();
        assert_eq!(range.revisions, 1);
    }

    #[test]
    fn out_of_order_revision_rejected() {
        let store = InMemoryStore::new();
        store
            .append(Observation::first_release("X", date(2024, 3, 1), 98.0, date(2024, 5, 10)))
            .unwrap();
        let err = store
            .append(Observation::first_release("X", date(2024, 3, 1), 100.0, date(2024, 4, 5)))
            .unwrap_err();
        assert!(matches!(err, VintageError::InvalidObservation { .. }));
    }

    #[test]
    fn rejected_append_leaves_no_trace() {
        let store = InMemoryStore::new();
        let err = store
            .append(Observation::first_release("Y", date(2024, 3, 1), f64::NAN, date(2024, 4, 5)))
            .unwrap_err();
        assert!(matches!(err, VintageError::InvalidObservation { .. }));
        assert!(store.list_series().unwrap().is_empty());
        assert!(store.series_range("Y").unwrap().is_none());

        store
            .append(Observation::first_release("X", date(2024, 3, 1), 98.0, date(2024, 5, 10)))
            .unwrap();
        store
            .append(Observation::first_release("X", date(2024, 4, 1), 1.0, date(2024, 1, 1)))
            .unwrap();
        assert!(store
            .append(Observation::first_release("X", date(2024, 3, 1), 100.0, date(2024, 4, 5)))
            .is_err());
        let range = store.series_range("X").unwrap().unwrap();
        assert_eq!(range.observations, 2);
        assert_eq!(range.revisions, 2);
    }

    #[test]
    fn query_respects_knowledge_bound_and_periods() {
        let store = InMemoryStore::new();
        store
            .append(Observation::first_release("X", date(2024, 1, 1), 1.0, date(2024, 2, 1)))
            .unwrap();
        store
            .append(Observation::first_release("X", date(2024, 2, 1), 2.0, date(2024, 3, 1)))
            .unwrap();

        let known = store
            .query("X", start_of_day(date(2024, 2, 15)), all_periods(date(2024, 12, 31)))
            .unwrap();
        assert_eq!(known.len(), 1);

        let window = store
            .query(
                "X",
                start_of_day(date(2024, 12, 31)),
                PeriodRange {
                    start: Some(date(2024, 2, 1)),
                    end: date(2024, 2, 1),
                },
            )
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].value, 2.0);
    }

    #[test]
    fn list_and_range() {
        let store = InMemoryStore::from_observations(vec![
            Observation::first_release("B", date(2024, 1, 1), 1.0, date(2024, 1, 2)),
            Observation::first_release("A", date(2024, 1, 1), 1.0, date(2024, 1, 2)),
            Observation::first_release("A", date(2024, 6, 1), 1.0, date(2024, 6, 2)),
        ])
        .unwrap();
        assert_eq!(store.list_series().unwrap(), vec!["A", "B"]);
        let range = store.series_range("A").unwrap().unwrap();
        assert_eq!(range.first_period, date(2024, 1, 1));
        assert_eq!(range.last_period, date(2024, 6, 1));
        assert_eq!(range.observations, 2);
        assert!(store.series_range("Z").unwrap().is_none());
    }
}
