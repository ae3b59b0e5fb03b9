//! Fetch-or-reuse orchestration for a two-instrument comparison.
//!
//! For every requested period the pipeline resolves one series per
//! instrument: a live cache entry is reused, otherwise the fetcher is called
//! and the fresh series is stored. The first fetch failure aborts the whole
//! comparison, so callers see either every pair or none.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockviz_core::{ComparisonPipeline, ComparisonRequest, GoogleFinanceFetcher, MemorySeriesCache};
//!
//! let pipeline = ComparisonPipeline::new(
//!     Arc::new(GoogleFinanceFetcher::default()),
//!     Arc::new(MemorySeriesCache::default()),
//! );
//! let handle = pipeline.spawn(request, |result| {
//!     // hand the result back to the presentation layer
//! });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cache::{CacheKey, SeriesCache};
use crate::fetcher::{FetchError, TimeSeriesFetcher};
use crate::metrics::{summarize, ComparisonSummary, MetricsError};
use crate::{InstrumentRef, Period, TimeSeries, ValidationError};

/// One point per trading day.
pub const DEFAULT_INTERVAL_SECS: u32 = 86_400;

/// Two instruments compared over an ordered list of periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRequest {
    pub instrument_a: InstrumentRef,
    pub instrument_b: InstrumentRef,
    pub periods: Vec<Period>,
    pub interval_secs: u32,
}

impl ComparisonRequest {
    pub fn new(
        instrument_a: InstrumentRef,
        instrument_b: InstrumentRef,
        periods: Vec<Period>,
        interval_secs: u32,
    ) -> Result<Self, ValidationError> {
        if periods.is_empty() {
            return Err(ValidationError::NoPeriods);
        }
        if interval_secs == 0 {
            return Err(ValidationError::ZeroInterval);
        }

        Ok(Self {
            instrument_a,
            instrument_b,
            periods,
            interval_secs,
        })
    }

    /// Daily-interval request.
    pub fn daily(
        instrument_a: InstrumentRef,
        instrument_b: InstrumentRef,
        periods: Vec<Period>,
    ) -> Result<Self, ValidationError> {
        Self::new(instrument_a, instrument_b, periods, DEFAULT_INTERVAL_SECS)
    }
}

/// Series for both instruments over the same period.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPair {
    pub period: Period,
    pub a: TimeSeries,
    pub b: TimeSeries,
}

impl SeriesPair {
    pub fn summarize(&self) -> Result<ComparisonSummary, MetricsError> {
        summarize(&self.a, &self.b)
    }
}

/// How the presentation layer should phrase a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    InvalidInstrument,
    Internal,
}

/// The fetch error that aborted a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonFailure {
    pub error: FetchError,
}

impl ComparisonFailure {
    pub const fn kind(&self) -> FailureKind {
        match self.error {
            FetchError::Network { .. } => FailureKind::Network,
            FetchError::EmptySeries { .. } => FailureKind::InvalidInstrument,
            FetchError::Malformed { .. } => FailureKind::Internal,
        }
    }

    pub fn instrument(&self) -> &InstrumentRef {
        self.error.instrument()
    }

    pub fn period(&self) -> &Period {
        self.error.period()
    }

    pub fn user_message(&self) -> String {
        match self.kind() {
            FailureKind::Network => String::from(
                "A network error occurred. Please check that you are connected to the internet.",
            ),
            FailureKind::InvalidInstrument => format!(
                "No price data was found for {}. Please check the instrument code and venue.",
                self.instrument()
            ),
            FailureKind::Internal => format!("Price data for {} could not be read.", self.instrument()),
        }
    }
}

/// Outcome of one comparison, delivered whole.
#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonResult {
    Success { pairs: Vec<SeriesPair> },
    Failure(ComparisonFailure),
}

impl ComparisonResult {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn pairs(&self) -> Option<&[SeriesPair]> {
        match self {
            Self::Success { pairs } => Some(pairs),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ComparisonFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

type KeyLock = tokio::sync::Mutex<()>;

/// Runs comparisons against an injected fetcher and cache.
#[derive(Clone)]
pub struct ComparisonPipeline {
    fetcher: Arc<dyn TimeSeriesFetcher>,
    cache: Arc<dyn SeriesCache>,
    in_flight: Arc<Mutex<HashMap<CacheKey, Weak<KeyLock>>>>,
}

impl ComparisonPipeline {
    pub fn new(fetcher: Arc<dyn TimeSeriesFetcher>, cache: Arc<dyn SeriesCache>) -> Self {
        Self {
            fetcher,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve every period of `request`, failing fast on the first fetch error.
    pub async fn compare(&self, request: &ComparisonRequest) -> ComparisonResult {
        let run_id = Uuid::new_v4();
        log::info!(
            "comparison {run_id}: {} vs {} over {} period(s)",
            request.instrument_a,
            request.instrument_b,
            request.periods.len()
        );

        let mut pairs = Vec::with_capacity(request.periods.len());
        for period in &request.periods {
            match self.resolve_pair(request, period).await {
                Ok((a, b)) => pairs.push(SeriesPair {
                    period: period.clone(),
                    a,
                    b,
                }),
                Err(error) => {
                    log::warn!("comparison {run_id} aborted: {error}");
                    return ComparisonResult::Failure(ComparisonFailure { error });
                }
            }
        }

        log::info!("comparison {run_id} resolved {} pair(s)", pairs.len());
        ComparisonResult::Success { pairs }
    }

    /// Run [`compare`](Self::compare) on a worker task and hand the result to
    /// `on_complete` there.
    pub fn spawn<F>(&self, request: ComparisonRequest, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(ComparisonResult) + Send + 'static,
    {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let result = pipeline.compare(&request).await;
            on_complete(result);
        })
    }

    async fn resolve_pair(
        &self,
        request: &ComparisonRequest,
        period: &Period,
    ) -> Result<(TimeSeries, TimeSeries), FetchError> {
        let interval = request.interval_secs;
        if request.instrument_a == request.instrument_b {
            let series = self
                .resolve_series(&request.instrument_a, period, interval)
                .await?;
            return Ok((series.clone(), series));
        }

        tokio::try_join!(
            self.resolve_series(&request.instrument_a, period, interval),
            self.resolve_series(&request.instrument_b, period, interval),
        )
    }

    /// Cache hit or fetch-and-store for one instrument and period.
    async fn resolve_series(
        &self,
        instrument: &InstrumentRef,
        period: &Period,
        interval_secs: u32,
    ) -> Result<TimeSeries, FetchError> {
        let key = CacheKey::new(instrument, period);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        match self.cache.get(&key).await {
            Ok(Some(series))
                if series.instrument() == instrument && series.interval_secs() == interval_secs =>
            {
                log::debug!("cache hit for {key}");
                return Ok(series);
            }
            Ok(Some(series)) if series.instrument() != instrument => log::debug!(
                "cached {key} belongs to {}, need {instrument}; refetching",
                series.instrument()
            ),
            Ok(Some(series)) => log::debug!(
                "cached {key} has interval {}s, need {interval_secs}s; refetching",
                series.interval_secs()
            ),
            Ok(None) => log::debug!("cache miss for {key}"),
            Err(error) => log::warn!("cache read for {key} failed, fetching instead: {error}"),
        }

        let series = self.fetcher.fetch(instrument, interval_secs, period).await?;

        if let Err(error) = self.cache.put(&key, &series).await {
            log::warn!("cache write for {key} failed: {error}");
        }

        Ok(series)
    }

    /// Per-key lock so concurrent comparisons never fetch the same key twice.
    fn key_lock(&self, key: &CacheKey) -> Arc<KeyLock> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(lock) = in_flight.get(key).and_then(Weak::upgrade) {
            return lock;
        }

        in_flight.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(KeyLock::new(()));
        in_flight.insert(key.clone(), Arc::downgrade(&lock));
        lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(code: &str) -> InstrumentRef {
        InstrumentRef::new(code, "NASDAQ").expect("instrument")
    }

    #[test]
    fn request_requires_periods_and_interval() {
        let err = ComparisonRequest::daily(instrument("A"), instrument("B"), Vec::new())
            .expect_err("must fail");
        assert_eq!(err, ValidationError::NoPeriods);

        let periods = vec![Period::parse("1M").expect("period")];
        let err = ComparisonRequest::new(instrument("A"), instrument("B"), periods, 0)
            .expect_err("must fail");
        assert_eq!(err, ValidationError::ZeroInterval);
    }

    #[test]
    fn failure_kind_follows_fetch_error() {
        let period = Period::parse("1M").expect("period");
        let network = ComparisonFailure {
            error: FetchError::Network {
                instrument: instrument("A"),
                period: period.clone(),
                message: String::from("timeout"),
            },
        };
        let empty = ComparisonFailure {
            error: FetchError::EmptySeries {
                instrument: instrument("ZZZZ"),
                period,
            },
        };

        assert_eq!(network.kind(), FailureKind::Network);
        assert!(network.user_message().contains("network"));
        assert_eq!(empty.kind(), FailureKind::InvalidInstrument);
        assert!(empty.user_message().contains("ZZZZ:NASDAQ"));
    }

    #[test]
    fn key_locks_are_shared_while_held() {
        let pipeline = ComparisonPipeline::new(
            Arc::new(NeverFetcher),
            Arc::new(crate::MemorySeriesCache::default()),
        );
        let key = CacheKey::new(&instrument("A"), &Period::parse("1M").expect("period"));

        let first = pipeline.key_lock(&key);
        let second = pipeline.key_lock(&key);
        assert!(Arc::ptr_eq(&first, &second));

        drop(first);
        drop(second);
        let third = pipeline.key_lock(&key);
        assert_eq!(Arc::strong_count(&third), 1);
    }

    struct NeverFetcher;

    impl TimeSeriesFetcher for NeverFetcher {
        fn fetch<'a>(
            &'a self,
            instrument: &'a InstrumentRef,
            _interval_secs: u32,
            period: &'a Period,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<TimeSeries, FetchError>> + Send + 'a>,
        > {
            Box::pin(async move {
                Err(FetchError::Network {
                    instrument: instrument.clone(),
                    period: period.clone(),
                    message: String::from("offline"),
                })
            })
        }
    }
}
