//! # Domain Models
//!
//! Strongly-typed values shared by the fetcher, cache, and pipeline.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`InstrumentRef`] | Instrument code plus the venue it trades on |
//! | [`Period`] | Requested history span label (`3d`, `1M`, `5Y`, ...) |
//! | [`TimeSeriesPoint`] | OHLCV observation at one instant |
//! | [`TimeSeries`] | Ordered points for one instrument and period |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Every constructor validates its invariants, so a value that exists is a
//! value the rest of the crate can trust:
//!
//! ```rust
//! use stockviz_core::{InstrumentRef, Period, ValidationError};
//!
//! let aapl = InstrumentRef::new("AAPL", "NASDAQ")?;
//! let period = Period::parse("1M")?;
//! assert_eq!(format!("{aapl}.{period}"), "AAPL:NASDAQ.1M");
//!
//! assert!(matches!(Period::parse("1W"), Err(ValidationError::InvalidPeriod { .. })));
//! # Ok::<(), ValidationError>(())
//! ```

mod instrument;
mod period;
mod series;
mod timestamp;

pub use instrument::InstrumentRef;
pub use period::{Period, PeriodUnit};
pub use series::{TimeSeries, TimeSeriesPoint};
pub use timestamp::UtcDateTime;
