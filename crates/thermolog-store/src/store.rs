//! Main store implementation.

use std::path::Path;
use std::time::Duration as StdDuration;

use rusqlite::{Connection, OptionalExtension, Row, params};
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

use thermolog_types::{Bucket, Reading};

use crate::error::{Error, Result};
use crate::models::{DailyAverage, HourlyAverage, StoreStats};
use crate::schema;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

// Running mean: avg' = avg + (v - avg) / (n + 1). SET expressions see the
// pre-update row, so both columns advance from the same old values.
const UPSERT_HOURLY: &str = "INSERT INTO hourly_avg (hour_start, avg_value, sample_count)
     VALUES (?1, ?2, 1)
     ON CONFLICT(hour_start) DO UPDATE SET
        avg_value = avg_value + (excluded.avg_value - avg_value) / (sample_count + 1),
        sample_count = sample_count + 1";

const UPSERT_DAILY: &str = "INSERT INTO daily_avg (day_start, avg_value, sample_count)
     VALUES (?1, ?2, 1)
     ON CONFLICT(day_start) DO UPDATE SET
        avg_value = avg_value + (excluded.avg_value - avg_value) / (sample_count + 1),
        sample_count = sample_count + 1";

/// SQLite-based store for thermolog readings.
///
/// The store is append-only: readings are never updated or deleted, and
/// aggregate rows are created on the first reading of their bucket and
/// updated by every later one, including late arrivals.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Write path
impl Store {
    /// Persist a reading and fold it into its hourly and daily averages.
    ///
    /// The raw insert and both aggregate upserts commit together or not at
    /// all. Returns the row id of the raw reading.
    pub fn append(&self, reading: &Reading) -> Result<i64> {
        let ts = reading.unix_timestamp();
        let hour_start = Bucket::Hour.start_of_unix(ts);
        let day_start = Bucket::Day.start_of_unix(ts);

        // Rolls back on drop unless committed
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO readings (timestamp, value) VALUES (?1, ?2)",
            params![ts, reading.value],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(UPSERT_HOURLY, params![hour_start, reading.value])?;
        tx.execute(UPSERT_DAILY, params![day_start, reading.value])?;
        tx.commit()?;

        debug!("Appended reading {} ({})", id, reading);
        Ok(id)
    }
}

// Raw reading queries
impl Store {
    /// Readings with `start <= timestamp <= end`, oldest first.
    ///
    /// Readings sharing a timestamp come back in arrival order.
    pub fn query_range(&self, start: OffsetDateTime, end: OffsetDateTime) -> Result<Vec<Reading>> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }

        let mut stmt = self.conn.prepare(
            "SELECT timestamp, value FROM readings
             WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(
                params![start.unix_timestamp(), end.unix_timestamp()],
                raw_reading,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(to_reading).collect()
    }

    /// The `n` most recent readings, oldest first.
    ///
    /// Returns every reading when fewer than `n` exist.
    pub fn query_recent(&self, n: usize) -> Result<Vec<Reading>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, value FROM readings
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], raw_reading)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut readings = rows
            .into_iter()
            .map(to_reading)
            .collect::<Result<Vec<_>>>()?;
        readings.reverse();
        Ok(readings)
    }

    /// The most recent reading, if any.
    pub fn latest(&self) -> Result<Option<Reading>> {
        let row = self
            .conn
            .query_row(
                "SELECT timestamp, value FROM readings
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                [],
                raw_reading,
            )
            .optional()?;

        row.map(to_reading).transpose()
    }

    /// Total number of raw readings.
    pub fn count_readings(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// Aggregate queries
impl Store {
    /// Hourly averages whose bucket starts within `lookback` of now, newest
    /// first.
    pub fn query_hourly(&self, lookback: Duration) -> Result<Vec<HourlyAverage>> {
        self.query_hourly_since(OffsetDateTime::now_utc() - lookback)
    }

    /// Hourly averages with `hour_start >= cutoff`, newest first.
    pub fn query_hourly_since(&self, cutoff: OffsetDateTime) -> Result<Vec<HourlyAverage>> {
        let mut stmt = self.conn.prepare(
            "SELECT hour_start, avg_value, sample_count FROM hourly_avg
             WHERE hour_start >= ?1
             ORDER BY hour_start DESC",
        )?;
        let rows = stmt
            .query_map([cutoff.unix_timestamp()], raw_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(start, avg_value, count)| {
                Ok(HourlyAverage {
                    hour_start: from_unix(start)?,
                    avg_value,
                    sample_count: count as u64,
                })
            })
            .collect()
    }

    /// Every daily average, newest first.
    pub fn query_daily(&self) -> Result<Vec<DailyAverage>> {
        let mut stmt = self.conn.prepare(
            "SELECT day_start, avg_value, sample_count FROM daily_avg
             ORDER BY day_start DESC",
        )?;
        let rows = stmt
            .query_map([], raw_aggregate)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(start, avg_value, count)| {
                Ok(DailyAverage {
                    day_start: from_unix(start)?,
                    avg_value,
                    sample_count: count as u64,
                })
            })
            .collect()
    }

    /// Summary counts and the covered time span.
    pub fn stats(&self) -> Result<StoreStats> {
        let (reading_count, first, last): (i64, Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM readings",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let hourly_buckets: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM hourly_avg", [], |row| row.get(0))?;
        let daily_buckets: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM daily_avg", [], |row| row.get(0))?;

        Ok(StoreStats {
            reading_count: reading_count as u64,
            hourly_buckets: hourly_buckets as u64,
            daily_buckets: daily_buckets as u64,
            first_reading: first.map(from_unix).transpose()?,
            last_reading: last.map(from_unix).transpose()?,
        })
    }
}

fn raw_reading(row: &Row<'_>) -> rusqlite::Result<(i64, f64)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn raw_aggregate(row: &Row<'_>) -> rusqlite::Result<(i64, f64, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_reading((timestamp, value): (i64, f64)) -> Result<Reading> {
    Ok(Reading::new(from_unix(timestamp)?, value))
}

fn from_unix(timestamp: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(timestamp).map_err(|_| Error::InvalidTimestamp(timestamp))
}
