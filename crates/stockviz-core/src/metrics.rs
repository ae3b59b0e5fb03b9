//! Change, percentage change, and winner for a pair of aligned series.

use std::fmt::{Display, Formatter};

use serde::Serialize;
use thiserror::Error;

use crate::TimeSeries;

/// Which side of a comparison moved more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Neither,
}

impl Display for Winner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::A => "A",
            Self::B => "B",
            Self::Neither => "NEITHER",
        })
    }
}

/// Percentage change, or the division-undefined sentinel for a zero open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PctChange {
    Defined(f64),
    Undefined,
}

impl PctChange {
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Defined(value) => Some(value),
            Self::Undefined => None,
        }
    }
}

/// Movement of one series across its period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SideSummary {
    pub open: f64,
    pub close: f64,
    pub change: f64,
    pub pct_change: PctChange,
}

impl SideSummary {
    fn of(series: &TimeSeries) -> Result<Self, MetricsError> {
        let (Some(first), Some(last)) = (series.first(), series.last()) else {
            return Err(MetricsError::EmptySeries {
                instrument: series.instrument().to_string(),
            });
        };

        let open = first.open;
        let close = last.close;
        let change = close - open;
        let pct_change = if open == 0.0 {
            PctChange::Undefined
        } else {
            PctChange::Defined(100.0 * change / open)
        };

        Ok(Self {
            open,
            close,
            change,
            pct_change,
        })
    }

    /// Label text such as `+2.00 +20.00%` or `-1.50 -3.10%`.
    pub fn display(&self) -> String {
        let sign = |negative: bool| if negative { '-' } else { '+' };
        let change_sign = sign(self.change < 0.0);
        match self.pct_change {
            PctChange::Defined(pct) => format!(
                "{change_sign}{:.2} {}{:.2}%",
                self.change.abs(),
                sign(pct < 0.0),
                pct.abs()
            ),
            PctChange::Undefined => format!("{change_sign}{:.2} n/a", self.change.abs()),
        }
    }
}

/// Display values for one compared period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub a: SideSummary,
    pub b: SideSummary,
    pub winner: Winner,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("series for {instrument} has no points")]
    EmptySeries { instrument: String },
}

/// Summarize two aligned series.
pub fn summarize(a: &TimeSeries, b: &TimeSeries) -> Result<ComparisonSummary, MetricsError> {
    let a = SideSummary::of(a)?;
    let b = SideSummary::of(b)?;

    let winner = match (a.pct_change, b.pct_change) {
        (PctChange::Defined(pct_a), PctChange::Defined(pct_b)) if pct_a > pct_b => Winner::A,
        (PctChange::Defined(pct_a), PctChange::Defined(pct_b)) if pct_b > pct_a => Winner::B,
        _ => Winner::Neither,
    };

    Ok(ComparisonSummary { a, b, winner })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstrumentRef, Period, TimeSeriesPoint, UtcDateTime};

    fn series(code: &str, open: f64, close: f64) -> TimeSeries {
        let point = |ts: i64, open: f64, close: f64| {
            TimeSeriesPoint::new(
                UtcDateTime::from_unix_timestamp(ts).expect("timestamp"),
                open,
                open.max(close),
                open.min(close),
                close,
                1_000,
            )
            .expect("point")
        };

        TimeSeries::new(
            InstrumentRef::new(code, "NYSE").expect("instrument"),
            Period::parse("1M").expect("period"),
            86_400,
            vec![point(0, open, open + 1.0), point(86_400, close - 1.0, close)],
        )
        .expect("series")
    }

    #[test]
    fn larger_gain_wins() {
        let summary = summarize(&series("A", 10.0, 12.0), &series("B", 10.0, 11.0))
            .expect("summary");

        assert_eq!(summary.winner, Winner::A);
        assert_eq!(summary.a.change, 2.0);
        assert_eq!(summary.a.pct_change, PctChange::Defined(20.0));
        assert_eq!(summary.b.pct_change, PctChange::Defined(10.0));
    }

    #[test]
    fn smaller_loss_wins() {
        let summary = summarize(&series("A", 10.0, 8.0), &series("B", 10.0, 9.0))
            .expect("summary");
        assert_eq!(summary.winner, Winner::B);
    }

    #[test]
    fn equal_change_is_a_tie() {
        let summary = summarize(&series("A", 10.0, 11.0), &series("B", 20.0, 22.0))
            .expect("summary");
        assert_eq!(summary.winner, Winner::Neither);

        let flat = summarize(&series("A", 5.0, 5.0), &series("B", 7.0, 7.0)).expect("summary");
        assert_eq!(flat.winner, Winner::Neither);
    }

    #[test]
    fn zero_open_is_undefined_not_infinite() {
        let summary = summarize(&series("A", 0.0, 3.0), &series("B", 10.0, 11.0))
            .expect("summary");

        assert_eq!(summary.a.pct_change, PctChange::Undefined);
        assert_eq!(summary.a.change, 3.0);
        assert_eq!(summary.winner, Winner::Neither);
    }

    #[test]
    fn empty_series_is_rejected() {
        let empty = TimeSeries::new(
            InstrumentRef::new("A", "NYSE").expect("instrument"),
            Period::parse("1M").expect("period"),
            86_400,
            Vec::new(),
        )
        .expect("series");

        let err = summarize(&empty, &series("B", 1.0, 2.0)).expect_err("must fail");
        assert!(matches!(err, MetricsError::EmptySeries { .. }));
    }

    #[test]
    fn display_matches_label_format() {
        let summary = summarize(&series("A", 10.0, 12.0), &series("B", 50.0, 48.45))
            .expect("summary");

        assert_eq!(summary.a.display(), "+2.00 +20.00%");
        assert_eq!(summary.b.display(), "-1.55 -3.10%");
    }
}
