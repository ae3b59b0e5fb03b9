//! Series cache contract and the in-memory implementation.
//!
//! The pipeline only sees [`SeriesCache`]. Entries live for
//! [`CachePolicy::ttl`] after they are stored, and once a write pushes the
//! entry count above [`CachePolicy::max_entries`] the entries with the oldest
//! `stored_at` are evicted first.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::{InstrumentRef, Period, TimeSeries, UtcDateTime};

pub const DEFAULT_TTL_SECS: i64 = 86_400;
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// Deterministic cache key: `{code}:{venue}.{period}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(instrument: &InstrumentRef, period: &Period) -> Self {
        Self(format!(
            "{}:{}.{}",
            instrument.code(),
            instrument.venue(),
            period.as_str()
        ))
    }

    /// Wrap a key read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expiry and size limits shared by every cache implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CachePolicy {
    pub fn expires_at(&self, stored_at: UtcDateTime) -> UtcDateTime {
        stored_at.saturating_add(self.ttl)
    }

    /// How many entries must go after a write left `len` entries behind.
    pub fn overflow(&self, len: usize) -> usize {
        len.saturating_sub(self.max_entries)
    }
}

/// A stored series with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub series: TimeSeries,
    pub stored_at: UtcDateTime,
    pub expires_at: UtcDateTime,
}

impl CacheEntry {
    pub fn is_live_at(&self, now: UtcDateTime) -> bool {
        now < self.expires_at
    }
}

/// Failures of the backing store. The pipeline treats all of them as a miss.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(String),

    #[error("cache storage error: {0}")]
    Storage(String),

    #[error("cache entry '{key}' is corrupt: {message}")]
    Corrupt { key: String, message: String },
}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key/value store for fetched series. Implementations must be safe under
/// concurrent calls and never expose a partially written entry.
pub trait SeriesCache: Send + Sync {
    /// Returns `None` when the key is absent or its entry has expired.
    fn get<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<TimeSeries>>;

    /// Stores `series` under `key`, replacing any previous entry, then evicts
    /// oldest entries while the store holds more than the policy allows.
    fn put<'a>(&'a self, key: &'a CacheKey, series: &'a TimeSeries) -> CacheFuture<'a, ()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    entry: CacheEntry,
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<CacheKey, MemoryEntry>,
    next_seq: u64,
}

impl CacheInner {
    fn insert(&mut self, entry: CacheEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.map.insert(entry.key.clone(), MemoryEntry { entry, seq });
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let key = self
            .map
            .values()
            .min_by_key(|item| (item.entry.stored_at, item.seq))
            .map(|item| item.entry.key.clone())?;
        self.map.remove(&key);
        Some(key)
    }
}

/// Thread-safe in-memory series cache.
#[derive(Debug, Clone)]
pub struct MemorySeriesCache {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySeriesCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl MemorySeriesCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::default())),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Entry under `key`, including expired ones.
    pub async fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        let store = self.inner.read().await;
        store.map.get(key).map(|item| item.entry.clone())
    }

    /// Number of entries, including expired ones.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut store = self.inner.write().await;
        let before = store.map.len();
        store.map.retain(|_, item| item.entry.is_live_at(now));
        before - store.map.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }
}

impl SeriesCache for MemorySeriesCache {
    fn get<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<TimeSeries>> {
        Box::pin(async move {
            let now = self.clock.now();
            let store = self.inner.read().await;
            Ok(store
                .map
                .get(key)
                .filter(|item| item.entry.is_live_at(now))
                .map(|item| item.entry.series.clone()))
        })
    }

    fn put<'a>(&'a self, key: &'a CacheKey, series: &'a TimeSeries) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            let stored_at = self.clock.now();
            let entry = CacheEntry {
                key: key.clone(),
                series: series.clone(),
                stored_at,
                expires_at: self.policy.expires_at(stored_at),
            };

            let mut store = self.inner.write().await;
            store.insert(entry);
            for _ in 0..self.policy.overflow(store.map.len()) {
                if let Some(evicted) = store.evict_oldest() {
                    log::debug!("evicted cache entry {evicted}");
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::TimeSeriesPoint;

    fn series(code: &str) -> TimeSeries {
        let ts = UtcDateTime::from_unix_timestamp(1_609_459_200).expect("timestamp");
        TimeSeries::new(
            InstrumentRef::new(code, "NASDAQ").expect("instrument"),
            Period::parse("1M").expect("period"),
            86_400,
            vec![TimeSeriesPoint::new(ts, 1.0, 2.0, 0.5, 1.5, 100).expect("point")],
        )
        .expect("series")
    }

    fn key(code: &str) -> CacheKey {
        CacheKey::new(
            &InstrumentRef::new(code, "NASDAQ").expect("instrument"),
            &Period::parse("1M").expect("period"),
        )
    }

    fn clock_at(seconds: i64) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            UtcDateTime::from_unix_timestamp(seconds).expect("timestamp"),
        ))
    }

    #[test]
    fn key_format_is_code_venue_period() {
        assert_eq!(key("AAPL").as_str(), "AAPL:NASDAQ.1M");
    }

    #[tokio::test]
    async fn put_then_get_returns_series() {
        let cache = MemorySeriesCache::default();

        assert_eq!(cache.get(&key("AAPL")).await, Ok(None));
        cache.put(&key("AAPL"), &series("AAPL")).await.expect("put");
        assert_eq!(cache.get(&key("AAPL")).await, Ok(Some(series("AAPL"))));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let clock = clock_at(1_000_000);
        let cache = MemorySeriesCache::with_clock(CachePolicy::default(), clock.clone());
        cache.put(&key("AAPL"), &series("AAPL")).await.expect("put");

        clock.advance(Duration::seconds(86_399));
        assert!(cache.get(&key("AAPL")).await.expect("get").is_some());

        clock.advance(Duration::seconds(2));
        assert!(cache.get(&key("AAPL")).await.expect("get").is_none());

        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn overwrite_refreshes_stored_at() {
        let clock = clock_at(0);
        let cache = MemorySeriesCache::with_clock(CachePolicy::default(), clock.clone());
        cache.put(&key("AAPL"), &series("AAPL")).await.expect("put");

        clock.advance(Duration::seconds(100));
        cache.put(&key("AAPL"), &series("AAPL")).await.expect("put");

        let entry = cache.entry(&key("AAPL")).await.expect("entry");
        assert_eq!(entry.stored_at.unix_timestamp(), 100);
        assert_eq!(entry.expires_at.unix_timestamp(), 86_500);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn evicts_oldest_entry_past_threshold() {
        let clock = clock_at(0);
        let policy = CachePolicy {
            max_entries: 3,
            ..CachePolicy::default()
        };
        let cache = MemorySeriesCache::with_clock(policy, clock.clone());

        for code in ["A", "B", "C", "D"] {
            cache.put(&key(code), &series(code)).await.expect("put");
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(cache.len().await, 3);
        assert!(cache.entry(&key("A")).await.is_none());
        assert!(cache.entry(&key("D")).await.is_some());
    }

    #[tokio::test]
    async fn eviction_ties_fall_back_to_insertion_order() {
        let cache = MemorySeriesCache::with_clock(
            CachePolicy {
                max_entries: 2,
                ..CachePolicy::default()
            },
            clock_at(0),
        );

        for code in ["A", "B", "C"] {
            cache.put(&key(code), &series(code)).await.expect("put");
        }

        assert!(cache.entry(&key("A")).await.is_none());
        assert!(cache.entry(&key("B")).await.is_some());
        assert!(cache.entry(&key("C")).await.is_some());
    }
}
