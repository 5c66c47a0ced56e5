//! Point-in-time loader: the only read path from the temporal store into analytics.
//!
//! Every accessor applies `knowledge_time <= as_of` and keeps, per observation
//! period, only the latest qualifying revision. Results are rebuilt on every call
//! and never cached across as-of dates, so re-running a query after new revisions
//! arrive returns exactly what it returned before.
//!
//! Absence of data is a normal outcome: accessors return empty collections or
//! `None` and never substitute values. Forward-filling is the engine's business.

use crate::domain::error::VintageError;
use crate::domain::observation::{start_of_day, Observation, PeriodRange, SeriesPoint};
use crate::ports::temporal_store::TemporalStore;
use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use tracing::debug;

/// Knowledge bound for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AsOf {
    date: NaiveDate,
    bound: NaiveDateTime,
}

impl AsOf {
    /// Everything published on or before `date`, up to the last instant of that day.
    pub fn end_of_day(date: NaiveDate) -> Self {
        AsOf {
            date,
            bound: start_of_day(date) + Duration::days(1) - Duration::nanoseconds(1),
        }
    }

    /// Everything published at or before `timestamp`.
    pub fn at(timestamp: NaiveDateTime) -> Self {
        AsOf {
            date: timestamp.date(),
            bound: timestamp,
        }
    }

    /// Everything ever recorded.
    pub fn unbounded() -> Self {
        AsOf::at(NaiveDateTime::MAX)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn bound(&self) -> NaiveDateTime {
        self.bound
    }
}

impl From<NaiveDate> for AsOf {
    fn from(date: NaiveDate) -> Self {
        AsOf::end_of_day(date)
    }
}

/// How far back from the as-of date observation periods are admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Days(u32),
    Months(u32),
    Unbounded,
}

impl Lookback {
    /// Inclusive period window ending at `as_of_date`.
    pub fn period_range(&self, as_of_date: NaiveDate) -> PeriodRange {
        let start = match *self {
            Lookback::Days(n) => as_of_date.checked_sub_signed(Duration::days(i64::from(n))),
            Lookback::Months(n) => as_of_date.checked_sub_months(Months::new(n)),
            Lookback::Unbounded => None,
        };
        PeriodRange {
            start,
            end: as_of_date,
        }
    }
}

/// Yield-curve snapshot: tenor -> latest known rate, in the order tenors were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveSnapshot {
    pub curve_id: String,
    pub as_of: NaiveDate,
    pub points: Vec<(String, SeriesPoint)>,
}

impl CurveSnapshot {
    pub fn rate(&self, tenor: &str) -> Option<f64> {
        self.points
            .iter()
            .find(|(t, _)| t == tenor)
            .map(|(_, p)| p.value)
    }

    /// `long - short`, if both tenors are known.
    pub fn spread(&self, short_tenor: &str, long_tenor: &str) -> Option<f64> {
        Some(self.rate(long_tenor)? - self.rate(short_tenor)?)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Ordered flow observations (e.g. fund or balance-of-payments flows).
#[derive(Debug, Clone, PartialEq)]
pub struct FlowWindow {
    pub series_id: String,
    pub points: Vec<SeriesPoint>,
}

impl FlowWindow {
    pub fn net(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Series id under which one tenor of a curve is stored.
pub fn curve_series_id(curve_id: &str, tenor: &str) -> String {
    format!("{curve_id}:{tenor}")
}

#[derive(Clone, Copy)]
pub struct PointInTimeLoader<'a> {
    store: &'a dyn TemporalStore,
}

impl<'a> PointInTimeLoader<'a> {
    pub fn new(store: &'a dyn TemporalStore) -> Self {
        PointInTimeLoader { store }
    }

    /// Ordered `(period, value)` pairs knowable at `as_of`, one per period.
    pub fn get_series(
        &self,
        series_id: &str,
        as_of: AsOf,
        lookback: Lookback,
    ) -> Result<Vec<SeriesPoint>, VintageError> {
        let latest = self.latest_revisions(series_id, as_of, lookback.period_range(as_of.date))?;
        Ok(latest.values().map(SeriesPoint::from).collect())
    }

    /// Most recent period knowable at `as_of` within the lookback.
    pub fn get_latest(
        &self,
        series_id: &str,
        as_of: AsOf,
        lookback: Lookback,
    ) -> Result<Option<SeriesPoint>, VintageError> {
        let latest = self.latest_revisions(series_id, as_of, lookback.period_range(as_of.date))?;
        Ok(latest.values().next_back().map(SeriesPoint::from))
    }

    /// Value for exactly `period`, as known at `as_of`.
    pub fn get_value(
        &self,
        series_id: &str,
        as_of: AsOf,
        period: NaiveDate,
    ) -> Result<Option<f64>, VintageError> {
        let range = PeriodRange {
            start: Some(period),
            end: period,
        };
        let latest = self.latest_revisions(series_id, as_of, range)?;
        Ok(latest.get(&period).map(|obs| obs.value))
    }

    /// Curve snapshot built from series `<curve_id>:<tenor>`. Tenors with nothing
    /// knowable inside the lookback are left out.
    pub fn get_curve(
        &self,
        curve_id: &str,
        tenors: &[&str],
        as_of: AsOf,
        lookback: Lookback,
    ) -> Result<CurveSnapshot, VintageError> {
        let mut points = Vec::with_capacity(tenors.len());
        for tenor in tenors {
            let series_id = curve_series_id(curve_id, tenor);
            if let Some(point) = self.get_latest(&series_id, as_of, lookback)? {
                points.push((tenor.to_string(), point));
            }
        }
        Ok(CurveSnapshot {
            curve_id: curve_id.to_string(),
            as_of: as_of.date,
            points,
        })
    }

    pub fn get_flows(
        &self,
        series_id: &str,
        as_of: AsOf,
        lookback: Lookback,
    ) -> Result<FlowWindow, VintageError> {
        Ok(FlowWindow {
            series_id: series_id.to_string(),
            points: self.get_series(series_id, as_of, lookback)?,
        })
    }

    /// Every revision of one period that was public at `as_of`, oldest first.
    pub fn get_vintages(
        &self,
        series_id: &str,
        period: NaiveDate,
        as_of: AsOf,
    ) -> Result<Vec<Observation>, VintageError> {
        let range = PeriodRange {
            start: Some(period),
            end: period,
        };
        let mut vintages: Vec<Observation> = self
            .store
            .query(series_id, as_of.bound, range)?
            .into_iter()
            .filter(|obs| obs.period == period && obs.known_at(as_of.bound))
            .collect();
        vintages.sort_by(|a, b| {
            a.knowledge_time
                .cmp(&b.knowledge_time)
                .then(a.revision_index.cmp(&b.revision_index))
        });
        Ok(vintages)
    }

    /// Capability handle bound to one as-of date.
    pub fn view(&self, as_of: AsOf) -> PitView<'a> {
        PitView {
            loader: *self,
            as_of,
        }
    }

    fn latest_revisions(
        &self,
        series_id: &str,
        as_of: AsOf,
        range: PeriodRange,
    ) -> Result<BTreeMap<NaiveDate, Observation>, VintageError> {
        let raw = self.store.query(series_id, as_of.bound, range)?;
        let fetched = raw.len();
        let latest = select_latest(raw, as_of.bound, range);
        debug!(
            series_id,
            as_of = %as_of.date,
            fetched,
            retained = latest.len(),
            "point-in-time query"
        );
        Ok(latest)
    }
}

/// Keep observations public at `bound` inside `range`, then the latest revision
/// per period. The store contract already bounds knowledge time; the loader is the
/// correctness boundary so the filter is applied here too.
fn select_latest(
    observations: Vec<Observation>,
    bound: NaiveDateTime,
    range: PeriodRange,
) -> BTreeMap<NaiveDate, Observation> {
    let mut latest: BTreeMap<NaiveDate, Observation> = BTreeMap::new();
    for obs in observations {
        if !obs.known_at(bound) || !range.contains(obs.period) {
            continue;
        }
        match latest.get(&obs.period) {
            Some(current)
                if (current.knowledge_time, current.revision_index)
                    >= (obs.knowledge_time, obs.revision_index) => {}
            _ => {
                latest.insert(obs.period, obs);
            }
        }
    }
    latest
}

/// Read-only loader handle fixed to the as-of date of one rebalance.
///
/// Signal producers only ever see a `PitView`, so a query past the rebalance date
/// cannot be expressed.
#[derive(Clone, Copy)]
pub struct PitView<'a> {
    loader: PointInTimeLoader<'a>,
    as_of: AsOf,
}

impl PitView<'_> {
    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of.date
    }

    pub fn as_of(&self) -> AsOf {
        self.as_of
    }

    pub fn series(&self, series_id: &str, lookback: Lookback) -> Result<Vec<SeriesPoint>, VintageError> {
        self.loader.get_series(series_id, self.as_of, lookback)
    }

    pub fn latest(
        &self,
        series_id: &str,
        lookback: Lookback,
    ) -> Result<Option<SeriesPoint>, VintageError> {
        self.loader.get_latest(series_id, self.as_of, lookback)
    }

    pub fn curve(
        &self,
        curve_id: &str,
        tenors: &[&str],
        lookback: Lookback,
    ) -> Result<CurveSnapshot, VintageError> {
        self.loader.get_curve(curve_id, tenors, self.as_of, lookback)
    }

    pub fn flows(&self, series_id: &str, lookback: Lookback) -> Result<FlowWindow, VintageError> {
        self.loader.get_flows(series_id, self.as_of, lookback)
    }
}
