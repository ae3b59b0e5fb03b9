use serde::{Deserialize, Serialize};

use crate::{InstrumentRef, Period, UtcDateTime, ValidationError};

/// One OHLCV observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl TimeSeriesPoint {
    pub fn new(
        timestamp: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_finite("open", open)?;
        validate_finite("high", high)?;
        validate_finite("low", low)?;
        validate_finite("close", close)?;

        Ok(Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Price history of one instrument over one period, strictly ordered by time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    instrument: InstrumentRef,
    period: Period,
    interval_secs: u32,
    points: Vec<TimeSeriesPoint>,
}

impl TimeSeries {
    pub fn new(
        instrument: InstrumentRef,
        period: Period,
        interval_secs: u32,
        points: Vec<TimeSeriesPoint>,
    ) -> Result<Self, ValidationError> {
        if interval_secs == 0 {
            return Err(ValidationError::ZeroInterval);
        }

        if let Some(index) = points
            .windows(2)
            .position(|pair| pair[0].timestamp >= pair[1].timestamp)
        {
            return Err(ValidationError::UnorderedSeries { index: index + 1 });
        }

        Ok(Self {
            instrument,
            period,
            interval_secs,
            points,
        })
    }

    pub fn instrument(&self) -> &InstrumentRef {
        &self.instrument
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub const fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    pub fn points(&self) -> &[TimeSeriesPoint] {
        &self.points
    }

    pub fn first(&self) -> Option<&TimeSeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TimeSeriesPoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}
