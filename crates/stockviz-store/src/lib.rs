//! DuckDB-backed persistent [`SeriesCache`].
//!
//! Entries survive process restarts and follow the same expiry and eviction
//! policy as the in-memory cache. Every write runs in its own transaction so
//! readers never observe a header without its points.

pub mod migrations;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ::duckdb::{params, Connection, OptionalExt, ToSql};
use stockviz_core::cache::{CacheEntry, CacheError, CacheFuture, CacheKey, CachePolicy, SeriesCache};
use stockviz_core::clock::{Clock, SystemClock};
use stockviz_core::config::resolve_home;
use stockviz_core::{InstrumentRef, Period, TimeSeries, TimeSeriesPoint, UtcDateTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("stored entry '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("series of {points} points is too large to store")]
    Oversized { points: usize },

    #[error("store worker failed: {0}")]
    Worker(String),
}

impl From<StoreError> for CacheError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Io(error) => Self::Io(error.to_string()),
            StoreError::Corrupt { key, message } => Self::Corrupt { key, message },
            StoreError::DuckDb(error) => Self::Storage(error.to_string()),
            StoreError::Worker(message) => Self::Storage(message),
            error @ StoreError::Oversized { .. } => Self::Storage(error.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub policy: CachePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_home(resolve_home())
    }
}

impl StoreConfig {
    /// Store at `<home>/cache/series.duckdb` with the default policy.
    pub fn in_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("cache").join("series.duckdb");
        Self {
            home,
            db_path,
            policy: CachePolicy::default(),
        }
    }
}

/// Bookkeeping for one stored entry, without its points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: CacheKey,
    pub points: usize,
    pub stored_at: UtcDateTime,
    pub expires_at: UtcDateTime,
}

impl StoredEntry {
    pub fn is_live_at(&self, now: UtcDateTime) -> bool {
        now < self.expires_at
    }
}

struct StoreInner {
    db_path: PathBuf,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    connection: Mutex<Connection>,
}

/// Persistent series cache over a single serialized DuckDB connection.
#[derive(Clone)]
pub struct SeriesStore {
    inner: Arc<StoreInner>,
}

struct Header {
    code: String,
    venue: String,
    period: String,
    interval_secs: i64,
    point_count: i64,
    stored_at: i64,
    expires_at: i64,
}

type PointRow = (i64, i64, f64, f64, f64, f64, u64);

impl SeriesStore {
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(StoreConfig::default())
    }

    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: StoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&config.db_path)?;
        migrations::apply_migrations(&connection)?;
        log::debug!("opened series store at {}", config.db_path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                db_path: config.db_path,
                policy: config.policy,
                clock,
                connection: Mutex::new(connection),
            }),
        })
    }

    pub fn db_path(&self) -> &Path {
        self.inner.db_path.as_path()
    }

    pub fn policy(&self) -> CachePolicy {
        self.inner.policy
    }

    /// Live series under `key`; expired entries read as absent.
    pub fn read(&self, key: &CacheKey) -> Result<Option<TimeSeries>, StoreError> {
        let now = self.inner.clock.now();
        Ok(self
            .entry(key)?
            .filter(|entry| entry.is_live_at(now))
            .map(|entry| entry.series))
    }

    /// Entry under `key`, including an expired one.
    pub fn entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
        let connection = self.connection();
        let header = connection
            .query_row(
                "SELECT code, venue, period, interval_secs, point_count, stored_at, expires_at \
                 FROM series_cache WHERE cache_key = ?",
                [key.as_str()],
                |row| {
                    Ok(Header {
                        code: row.get(0)?,
                        venue: row.get(1)?,
                        period: row.get(2)?,
                        interval_secs: row.get(3)?,
                        point_count: row.get(4)?,
                        stored_at: row.get(5)?,
                        expires_at: row.get(6)?,
                    })
                },
            )
            .optional()?;

        let Some(header) = header else {
            return Ok(None);
        };

        let mut statement = connection.prepare(
            "SELECT ts, ts_nanos, open, high, low, close, volume FROM series_points \
             WHERE cache_key = ? ORDER BY idx",
        )?;
        let rows = statement
            .query_map([key.as_str()], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            })?
            .collect::<Result<Vec<PointRow>, _>>()?;

        decode_entry(key, header, rows).map(Some)
    }

    /// Store `series` under `key`, then evict oldest entries past the limit.
    pub fn write(&self, key: &CacheKey, series: &TimeSeries) -> Result<(), StoreError> {
        let stored_at = self.inner.clock.now();
        let expires_at = self.inner.policy.expires_at(stored_at);

        let connection = self.connection();
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<Vec<String>, StoreError> {
            delete_keys(&connection, &[key.as_str().to_owned()])?;

            let seq: i64 = connection.query_row(
                "SELECT COALESCE(MAX(seq), 0) + 1 FROM series_cache",
                [],
                |row| row.get(0),
            )?;
            let point_count = point_count(series.len())?;
            let interval_secs = i64::from(series.interval_secs());
            let (stored_at, expires_at) = (stored_at.unix_timestamp(), expires_at.unix_timestamp());
            let (code, venue) = (series.instrument().code(), series.instrument().venue());
            let key_text = key.as_str();
            let period = series.period().as_str();
            let params: [&dyn ToSql; 9] = [
                &key_text,
                &code,
                &venue,
                &period,
                &interval_secs,
                &point_count,
                &stored_at,
                &expires_at,
                &seq,
            ];
            connection.execute(
                "INSERT INTO series_cache \
                 (cache_key, code, venue, period, interval_secs, point_count, stored_at, expires_at, seq) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params.as_slice(),
            )?;

            let mut appender = connection.appender("series_points")?;
            for (idx, point) in (0_i64..).zip(series.points()) {
                appender.append_row(params![
                    key.as_str(),
                    idx,
                    point.timestamp.unix_timestamp(),
                    i64::from(point.timestamp.subsec_nanos()),
                    point.open,
                    point.high,
                    point.low,
                    point.close,
                    point.volume,
                ])?;
            }
            appender.flush()?;
            drop(appender);

            evict_overflow(&connection, self.inner.policy)
        })();

        let evicted = finalize_transaction(&connection, result)?;
        for evicted in evicted {
            log::debug!("evicted stored series {evicted}");
        }
        Ok(())
    }

    /// Number of entries, including expired ones.
    pub fn len(&self) -> Result<usize, StoreError> {
        let connection = self.connection();
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM series_cache", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Oldest first.
    pub fn entries(&self) -> Result<Vec<StoredEntry>, StoreError> {
        let connection = self.connection();
        let mut statement = connection.prepare(
            "SELECT cache_key, point_count, stored_at, expires_at FROM series_cache \
             ORDER BY stored_at, seq",
        )?;
        let rows = statement
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, points, stored_at, expires_at)| {
                let corrupt = |message: String| StoreError::Corrupt {
                    key: key.clone(),
                    message,
                };
                Ok(StoredEntry {
                    points: usize::try_from(points)
                        .map_err(|_| corrupt(format!("negative point count {points}")))?,
                    stored_at: decode_timestamp(stored_at).map_err(corrupt)?,
                    expires_at: decode_timestamp(expires_at).map_err(corrupt)?,
                    key: CacheKey::from_stored(key.clone()),
                })
            })
            .collect()
    }

    /// Drop expired entries, returning how many went.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.inner.clock.now().unix_timestamp();
        let connection = self.connection();
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            connection.execute(
                "DELETE FROM series_points WHERE cache_key IN \
                 (SELECT cache_key FROM series_cache WHERE expires_at <= ?)",
                [now],
            )?;
            Ok(connection.execute("DELETE FROM series_cache WHERE expires_at <= ?", [now])?)
        })();
        finalize_transaction(&connection, result)
    }

    /// Drop every entry, returning how many went.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let connection = self.connection();
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, StoreError> {
            connection.execute("DELETE FROM series_points", [])?;
            Ok(connection.execute("DELETE FROM series_cache", [])?)
        })();
        finalize_transaction(&connection, result)
    }

    fn connection(&self) -> MutexGuard<'_, Connection> {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SeriesCache for SeriesStore {
    fn get<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<TimeSeries>> {
        let store = self.clone();
        let key = key.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.read(&key))
                .await
                .map_err(|error| StoreError::Worker(error.to_string()))?
                .map_err(CacheError::from)
        })
    }

    fn put<'a>(&'a self, key: &'a CacheKey, series: &'a TimeSeries) -> CacheFuture<'a, ()> {
        let store = self.clone();
        let key = key.clone();
        let series = series.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || store.write(&key, &series))
                .await
                .map_err(|error| StoreError::Worker(error.to_string()))?
                .map_err(CacheError::from)
        })
    }
}

fn delete_keys(connection: &Connection, keys: &[String]) -> Result<(), StoreError> {
    for key in keys {
        connection.execute("DELETE FROM series_points WHERE cache_key = ?", [key])?;
        connection.execute("DELETE FROM series_cache WHERE cache_key = ?", [key])?;
    }
    Ok(())
}

fn evict_overflow(connection: &Connection, policy: CachePolicy) -> Result<Vec<String>, StoreError> {
    let count: i64 =
        connection.query_row("SELECT COUNT(*) FROM series_cache", [], |row| row.get(0))?;
    let overflow = policy.overflow(usize::try_from(count).unwrap_or_default());
    if overflow == 0 {
        return Ok(Vec::new());
    }

    let limit = i64::try_from(overflow).unwrap_or(i64::MAX);
    let mut statement = connection
        .prepare("SELECT cache_key FROM series_cache ORDER BY stored_at, seq LIMIT ?")?;
    let victims = statement
        .query_map([limit], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    delete_keys(connection, &victims)?;
    Ok(victims)
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn point_count(len: usize) -> Result<i64, StoreError> {
    i64::try_from(len).map_err(|_| StoreError::Oversized { points: len })
}

fn decode_point_timestamp(seconds: i64, nanos: i64) -> Result<UtcDateTime, String> {
    let nanos = u32::try_from(nanos)
        .ok()
        .filter(|nanos| *nanos < 1_000_000_000)
        .ok_or_else(|| format!("sub-second part {nanos} out of range"))?;
    UtcDateTime::from_unix_parts(seconds, nanos).map_err(|error| error.to_string())
}

fn decode_timestamp(seconds: i64) -> Result<UtcDateTime, String> {
    UtcDateTime::from_unix_timestamp(seconds).map_err(|error| error.to_string())
}

fn decode_entry(
    key: &CacheKey,
    header: Header,
    rows: Vec<PointRow>,
) -> Result<CacheEntry, StoreError> {
    let corrupt = |message: String| StoreError::Corrupt {
        key: key.to_string(),
        message,
    };

    if usize::try_from(header.point_count).ok() != Some(rows.len()) {
        return Err(corrupt(format!(
            "header lists {} points, found {}",
            header.point_count,
            rows.len()
        )));
    }

    let instrument = InstrumentRef::new(&header.code, &header.venue)
        .map_err(|error| corrupt(error.to_string()))?;
    let period = Period::parse(&header.period).map_err(|error| corrupt(error.to_string()))?;
    let interval_secs = u32::try_from(header.interval_secs)
        .map_err(|_| corrupt(format!("interval {} out of range", header.interval_secs)))?;

    let points = rows
        .into_iter()
        .map(|(ts, ts_nanos, open, high, low, close, volume)| {
            let timestamp = decode_point_timestamp(ts, ts_nanos)?;
            TimeSeriesPoint::new(timestamp, open, high, low, close, volume)
                .map_err(|error| error.to_string())
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(corrupt)?;

    let series = TimeSeries::new(instrument, period, interval_secs, points)
        .map_err(|error| corrupt(error.to_string()))?;

    Ok(CacheEntry {
        key: key.clone(),
        series,
        stored_at: decode_timestamp(header.stored_at).map_err(corrupt)?,
        expires_at: decode_timestamp(header.expires_at).map_err(corrupt)?,
    })
}
