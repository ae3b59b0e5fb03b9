//! # Stockviz Core
//!
//! Fetching, caching, and comparing historical price series for two
//! instruments across several periods.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Instruments, periods, series, timestamps |
//! | [`wire`] | Line parser for the anchor/offset price format |
//! | [`fetcher`] | `TimeSeriesFetcher` trait and the HTTP implementation |
//! | [`cache`] | `SeriesCache` trait, key, expiry policy, in-memory cache |
//! | [`pipeline`] | Fetch-or-reuse orchestration with fail-fast semantics |
//! | [`metrics`] | Change, percentage change, and winner |
//! | [`config`] | Saved instruments and periods |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`clock`] | Injectable time source |
//!
//! ## Flow
//!
//! ```text
//! ComparisonRequest ─▶ ComparisonPipeline ─┬─▶ SeriesCache (hit)
//!                                          └─▶ TimeSeriesFetcher ─▶ HttpClient
//!                                                      │
//!                                                      ▼
//!                       ComparisonResult ─▶ metrics::summarize
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod metrics;
pub mod pipeline;
pub mod wire;

pub use cache::{
    CacheEntry, CacheError, CacheFuture, CacheKey, CachePolicy, MemorySeriesCache, SeriesCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ComparisonConfig, ConfigError};
pub use domain::{InstrumentRef, Period, PeriodUnit, TimeSeries, TimeSeriesPoint, UtcDateTime};
pub use error::ValidationError;
pub use fetcher::{FetchError, FetcherConfig, GoogleFinanceFetcher, TimeSeriesFetcher};
pub use http_client::{
    HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use metrics::{summarize, ComparisonSummary, MetricsError, PctChange, SideSummary, Winner};
pub use pipeline::{
    ComparisonFailure, ComparisonPipeline, ComparisonRequest, ComparisonResult, FailureKind,
    SeriesPair,
};
pub use wire::{parse_body, ParserState, RowAnomaly, SkipReason, WireParse, WireParser};
