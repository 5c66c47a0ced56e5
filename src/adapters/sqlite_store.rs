//! SQLite temporal store.
//!
//! Observations are append-only rows keyed by `(series_id, period, revision_index)`.
//! Timestamps are stored as fixed-width ISO text so lexicographic comparison in SQL
//! matches chronological order.

use crate::domain::error::VintageError;
use crate::domain::observation::{
    plan_append, start_of_day, AppendPlan, Observation, PeriodRange,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::temporal_store::{SeriesRange, TemporalStore};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, Transaction};
use tracing::debug;

const PERIOD_FORMAT: &str = "%Y-%m-%d";
const KNOWLEDGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_err(e: r2d2::Error) -> VintageError {
    VintageError::Store {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> VintageError {
    VintageError::StoreQuery {
        reason: e.to_string(),
    }
}

fn format_period(date: NaiveDate) -> String {
    date.format(PERIOD_FORMAT).to_string()
}

fn format_knowledge(ts: NaiveDateTime) -> String {
    ts.format(KNOWLEDGE_FORMAT).to_string()
}

/// Query bounds clamped to four-digit years so text comparison stays chronological.
fn period_bound(date: NaiveDate) -> String {
    format_period(date.clamp(min_period(), max_period()))
}

fn knowledge_bound(ts: NaiveDateTime) -> String {
    let lowest = start_of_day(min_period());
    let highest = start_of_day(max_period()) + Duration::days(1) - Duration::nanoseconds(1);
    format_knowledge(ts.clamp(lowest, highest))
}

fn min_period() -> NaiveDate {
    NaiveDate::from_ymd_opt(0, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn max_period() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

fn conversion_failure(text: &str, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        text.len(),
        rusqlite::types::Type::Text,
        Box::new(e),
    )
}

fn row_to_observation(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let period_str: String = row.get(1)?;
    let period = NaiveDate::parse_from_str(&period_str, PERIOD_FORMAT)
        .map_err(|e| conversion_failure(&period_str, e))?;
    let knowledge_str: String = row.get(3)?;
    let knowledge_time = NaiveDateTime::parse_from_str(&knowledge_str, KNOWLEDGE_FORMAT)
        .map_err(|e| conversion_failure(&knowledge_str, e))?;
    Ok(Observation {
        series_id: row.get(0)?,
        period,
        value: row.get(2)?,
        knowledge_time,
        revision_index: row.get(4)?,
    })
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, VintageError> {
        let db_path = config
            .get_string("store", "path")
            .ok_or_else(|| VintageError::config_missing("store", "path"))?;

        let pool_size = config.get_int("store", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, VintageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, VintageError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), VintageError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS observations (
                    series_id TEXT NOT NULL,
                    period TEXT NOT NULL,
                    value REAL NOT NULL,
                    knowledge_time TEXT NOT NULL,
                    revision_index INTEGER NOT NULL,
                    PRIMARY KEY (series_id, period, revision_index)
                );
                CREATE INDEX IF NOT EXISTS idx_observations_knowledge
                    ON observations(series_id, knowledge_time);",
            )
            .map_err(query_err)
    }

    /// Append many observations in one transaction. Returns how many rows were new.
    pub fn append_batch(&self, observations: &[Observation]) -> Result<usize, VintageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let mut inserted = 0;
        for obs in observations {
            if let Some(_stored) = append_in(&tx, obs)? {
                inserted += 1;
            }
        }
        tx.commit().map_err(query_err)?;
        debug!(inserted, total = observations.len(), "sqlite batch append");
        Ok(inserted)
    }
}

/// Returns the stored row, or `None` when the observation was a duplicate.
fn append_in(tx: &Transaction<'_>, obs: &Observation) -> Result<Option<Observation>, VintageError> {
    let latest = tx
        .query_row(
            "SELECT series_id, period, value, knowledge_time, revision_index
             FROM observations
             WHERE series_id = ?1 AND period = ?2
             ORDER BY revision_index DESC
             LIMIT 1",
            params![obs.series_id, format_period(obs.period)],
            row_to_observation,
        )
        .optional()
        .map_err(query_err)?;

    match plan_append(latest.as_ref(), obs)? {
        AppendPlan::Duplicate => Ok(None),
        AppendPlan::Insert(revision_index) => {
            tx.execute(
                "INSERT INTO observations (series_id, period, value, knowledge_time, revision_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    obs.series_id,
                    format_period(obs.period),
                    obs.value,
                    format_knowledge(obs.knowledge_time),
                    revision_index
                ],
            )
            .map_err(query_err)?;
            Ok(Some(Observation {
                revision_index,
                ..obs.clone()
            }))
        }
    }
}

impl TemporalStore for SqliteStore {
    fn query(
        &self,
        series_id: &str,
        max_knowledge_time: NaiveDateTime,
        periods: PeriodRange,
    ) -> Result<Vec<Observation>, VintageError> {
        let conn = self.conn()?;
        let start = periods.start.map(period_bound).unwrap_or_default();

        let mut stmt = conn
            .prepare(
                "SELECT series_id, period, value, knowledge_time, revision_index
                 FROM observations
                 WHERE series_id = ?1 AND knowledge_time <= ?2 AND period >= ?3 AND period <= ?4
                 ORDER BY period ASC, revision_index ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    series_id,
                    knowledge_bound(max_knowledge_time),
                    start,
                    period_bound(periods.end)
                ],
                row_to_observation,
            )
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn append(&self, observation: Observation) -> Result<Observation, VintageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let stored = append_in(&tx, &observation)?;
        tx.commit().map_err(query_err)?;
        Ok(stored.unwrap_or(observation))
    }

    fn list_series(&self) -> Result<Vec<String>, VintageError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT series_id FROM observations ORDER BY series_id")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn series_range(&self, series_id: &str) -> Result<Option<SeriesRange>, VintageError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64, i64) = conn
            .query_row(
                "SELECT MIN(period), MAX(period), COUNT(DISTINCT period), COUNT(*)
                 FROM observations WHERE series_id = ?1",
                params![series_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), periods, rows) if rows > 0 => {
                let parse = |s: &str| {
                    NaiveDate::parse_from_str(s, PERIOD_FORMAT).map_err(|e| VintageError::Store {
                        reason: e.to_string(),
                    })
                };
                Ok(Some(SeriesRange {
                    first_period: parse(&min_str)?,
                    last_period: parse(&max_str)?,
                    observations: periods as usize,
                    revisions: rows as usize,
                }))
            }
            _ => Ok(None),
        }
    }
}
