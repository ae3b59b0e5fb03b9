use thiserror::Error;

/// Validation and contract errors exposed by `stockviz-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("instrument code cannot be empty")]
    EmptyInstrumentCode,
    #[error("instrument venue cannot be empty")]
    EmptyVenue,
    #[error("instrument must be written as CODE:VENUE, got '{value}'")]
    InvalidInstrumentSpec { value: String },

    #[error("invalid period '{value}', expected a count followed by d, M or Y (e.g. 1M, 5Y)")]
    InvalidPeriod { value: String },
    #[error("comparison request must include at least one period")]
    NoPeriods,
    #[error("interval must be greater than zero seconds")]
    ZeroInterval,

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unix timestamp {value} is out of range")]
    TimestampOutOfRange { value: i64 },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },

    #[error("series points must be strictly increasing in time (violated at index {index})")]
    UnorderedSeries { index: usize },
}
