//! Parser for the upstream anchor/offset price format.
//!
//! The body is newline-delimited text. The first [`PREAMBLE_LINES`] lines are
//! header noise and are skipped without inspection. After that, each line is
//! one of:
//!
//! ```text
//! a1609459200,100,105,95,101,1000   anchor: absolute unix seconds after the marker
//! 1,102,106,96,100,1100             relative row: offset in intervals from the anchor
//! TIMEZONE_OFFSET=-240              noise, skipped
//! ```
//!
//! Data columns arrive as `offset, close, high, low, open, volume`. Anchor
//! lines only move the parser from [`ParserState::AwaitingAnchor`] to
//! [`ParserState::HaveAnchor`]; their own columns are not emitted as a point.
//!
//! Rows with a known malformed shape are dropped and recorded as a
//! [`SkipReason`]. Rows that parse but would break the series ordering are
//! dropped, logged, and recorded as a [`RowAnomaly`].

use crate::{TimeSeriesPoint, UtcDateTime};

/// Number of leading header lines in every response.
pub const PREAMBLE_LINES: usize = 7;

/// Prefix of the first field on anchor lines.
pub const ANCHOR_MARKER: char = 'a';

const DATA_COLUMNS: usize = 6;

/// Parser position in the anchor/offset protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingAnchor,
    HaveAnchor(i64),
}

/// Known malformed row shapes that are skipped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    /// First field is neither an anchor nor an integer offset.
    NonNumericLead,
    /// Anchor marker present but not followed by an integer.
    BadAnchor,
    /// Relative row seen before any anchor.
    NoAnchor,
    ShortRow,
    /// A price or volume column that is not a finite number.
    BadField { column: usize },
}

/// Rows that parsed cleanly but cannot be placed in the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAnomaly {
    TimestampOverflow { line: usize },
    NonIncreasing { line: usize, timestamp: i64 },
}

/// Result of parsing one response body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireParse {
    pub points: Vec<TimeSeriesPoint>,
    /// `(line number, reason)`, 1-based and counting the preamble.
    pub skipped: Vec<(usize, SkipReason)>,
    pub anomalies: Vec<RowAnomaly>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RelativeRow {
    offset: i64,
    close: f64,
    high: f64,
    low: f64,
    open: f64,
    volume: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Line {
    Anchor(i64),
    Row(RelativeRow),
    Skip(SkipReason),
}

/// Parse a full response body with the given point interval.
pub fn parse_body(body: &str, interval_secs: u32) -> WireParse {
    let mut parser = WireParser::new(interval_secs);
    for (index, line) in body.lines().enumerate().skip(PREAMBLE_LINES) {
        parser.feed(index + 1, line);
    }
    parser.finish()
}

/// Incremental parser; feed lines after the preamble in order.
#[derive(Debug)]
pub struct WireParser {
    state: ParserState,
    interval_secs: i64,
    last_timestamp: Option<i64>,
    output: WireParse,
}

impl WireParser {
    pub fn new(interval_secs: u32) -> Self {
        Self {
            state: ParserState::AwaitingAnchor,
            interval_secs: i64::from(interval_secs),
            last_timestamp: None,
            output: WireParse::default(),
        }
    }

    pub const fn state(&self) -> ParserState {
        self.state
    }

    pub fn feed(&mut self, line_no: usize, line: &str) {
        match (self.state, classify(line)) {
            (_, Line::Anchor(anchor)) => {
                self.state = ParserState::HaveAnchor(anchor);
            }
            (_, Line::Skip(reason)) => self.skip(line_no, reason),
            (ParserState::AwaitingAnchor, Line::Row(_)) => self.skip(line_no, SkipReason::NoAnchor),
            (ParserState::HaveAnchor(anchor), Line::Row(row)) => self.push_row(line_no, anchor, row),
        }
    }

    pub fn finish(self) -> WireParse {
        self.output
    }

    fn skip(&mut self, line_no: usize, reason: SkipReason) {
        log::trace!("skipping line {line_no}: {reason:?}");
        self.output.skipped.push((line_no, reason));
    }

    fn push_row(&mut self, line_no: usize, anchor: i64, row: RelativeRow) {
        let timestamp = row
            .offset
            .checked_mul(self.interval_secs)
            .and_then(|delta| anchor.checked_add(delta))
            .and_then(|seconds| UtcDateTime::from_unix_timestamp(seconds).ok());

        let Some(timestamp) = timestamp else {
            self.anomaly(RowAnomaly::TimestampOverflow { line: line_no });
            return;
        };

        let seconds = timestamp.unix_timestamp();
        if self.last_timestamp.is_some_and(|last| seconds <= last) {
            self.anomaly(RowAnomaly::NonIncreasing {
                line: line_no,
                timestamp: seconds,
            });
            return;
        }

        let point = TimeSeriesPoint {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        self.last_timestamp = Some(seconds);
        self.output.points.push(point);
    }

    fn anomaly(&mut self, anomaly: RowAnomaly) {
        log::warn!("dropping out-of-sequence price row: {anomaly:?}");
        self.output.anomalies.push(anomaly);
    }
}

fn classify(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() {
        return Line::Skip(SkipReason::Blank);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let lead = fields[0];

    if let Some(rest) = lead.strip_prefix(ANCHOR_MARKER) {
        return match rest.parse::<i64>() {
            Ok(anchor) => Line::Anchor(anchor),
            Err(_) => Line::Skip(SkipReason::BadAnchor),
        };
    }

    let Ok(offset) = lead.parse::<i64>() else {
        return Line::Skip(SkipReason::NonNumericLead);
    };

    if fields.len() < DATA_COLUMNS {
        return Line::Skip(SkipReason::ShortRow);
    }

    let price = |column: usize| {
        fields[column]
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or(SkipReason::BadField { column })
    };

    let row = (|| -> Result<RelativeRow, SkipReason> {
        Ok(RelativeRow {
            offset,
            close: price(1)?,
            high: price(2)?,
            low: price(3)?,
            open: price(4)?,
            volume: parse_volume(fields[5]).ok_or(SkipReason::BadField { column: 5 })?,
        })
    })();

    match row {
        Ok(row) => Line::Row(row),
        Err(reason) => Line::Skip(reason),
    }
}

fn parse_volume(field: &str) -> Option<u64> {
    if let Ok(volume) = field.parse::<u64>() {
        return Some(volume);
    }

    let value = field.parse::<f64>().ok()?;
    let representable = value.is_finite() && value >= 0.0 && value.fract() == 0.0;
    // `u64::MAX as f64` rounds up to 2^64, so the bound must be exclusive.
    (representable && value < u64::MAX as f64).then_some(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preamble() -> String {
        [
            "EXCHANGE%3DNASDAQ",
            "MARKET_OPEN_MINUTE=570",
            "MARKET_CLOSE_MINUTE=960",
            "INTERVAL=86400",
            "COLUMNS=DATE,CLOSE,HIGH,LOW,OPEN,VOLUME",
            "DATA=",
            "TIMEZONE_OFFSET=-300",
        ]
        .join("\n")
    }

    #[test]
    fn classifies_anchor_lines() {
        assert_eq!(classify("a1609459200,100,105,95,101,1000"), Line::Anchor(1_609_459_200));
        assert_eq!(classify("a"), Line::Skip(SkipReason::BadAnchor));
        assert_eq!(classify("abc,1,2,3,4,5"), Line::Skip(SkipReason::BadAnchor));
    }

    #[test]
    fn classifies_malformed_shapes() {
        assert_eq!(classify("   "), Line::Skip(SkipReason::Blank));
        assert_eq!(classify("TIMEZONE_OFFSET=-240"), Line::Skip(SkipReason::NonNumericLead));
        assert_eq!(classify("3,100,105"), Line::Skip(SkipReason::ShortRow));
        assert_eq!(
            classify("3,100,x,95,101,1000"),
            Line::Skip(SkipReason::BadField { column: 2 })
        );
        assert_eq!(
            classify("3,NaN,105,95,101,1000"),
            Line::Skip(SkipReason::BadField { column: 1 })
        );
        assert_eq!(
            classify("3,100,105,95,101,-4"),
            Line::Skip(SkipReason::BadField { column: 5 })
        );
    }

    #[test]
    fn anchor_state_transitions() {
        let mut parser = WireParser::new(60);
        assert_eq!(parser.state(), ParserState::AwaitingAnchor);

        parser.feed(8, "1,1,1,1,1,1");
        assert_eq!(parser.state(), ParserState::AwaitingAnchor);

        parser.feed(9, "a1000,1,1,1,1,1");
        assert_eq!(parser.state(), ParserState::HaveAnchor(1000));

        parser.feed(10, "TIMEZONE_OFFSET=-240");
        assert_eq!(parser.state(), ParserState::HaveAnchor(1000));

        parser.feed(11, "a5000,1,1,1,1,1");
        parser.feed(12, "2,1,1,1,1,1");

        let parsed = parser.finish();
        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.points[0].timestamp.unix_timestamp(), 5_120);
        assert_eq!(
            parsed.skipped,
            vec![(8, SkipReason::NoAnchor), (10, SkipReason::NonNumericLead)]
        );
    }

    #[test]
    fn maps_upstream_column_order() {
        let body = format!("{}\na1609459200\n0,100,105,95,101,1000\n", preamble());
        let parsed = parse_body(&body, 86_400);

        let point = &parsed.points[0];
        assert_eq!(point.close, 100.0);
        assert_eq!(point.high, 105.0);
        assert_eq!(point.low, 95.0);
        assert_eq!(point.open, 101.0);
        assert_eq!(point.volume, 1000);
    }

    #[test]
    fn preamble_is_not_inspected() {
        let body = "a1,1,1,1,1,1\n0,1,1,1,1,1\n\n\n\n\n\na100\n0,2,2,2,2,2\r\n";
        let parsed = parse_body(body, 10);

        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.points[0].timestamp.unix_timestamp(), 100);
        assert_eq!(parsed.points[0].close, 2.0);
    }

    #[test]
    fn reports_non_increasing_rows_as_anomalies() {
        let body = format!("{}\na1000\n0,1,1,1,1,1\n2,1,1,1,1,1\n1,1,1,1,1,1\n", preamble());
        let parsed = parse_body(&body, 10);

        assert_eq!(parsed.points.len(), 2);
        assert_eq!(
            parsed.anomalies,
            vec![RowAnomaly::NonIncreasing {
                line: 11,
                timestamp: 1_010
            }]
        );
    }

    #[test]
    fn reports_overflowing_offsets_as_anomalies() {
        let body = format!("{}\na1000\n{},1,1,1,1,1\n", preamble(), i64::MAX);
        let parsed = parse_body(&body, 86_400);

        assert!(parsed.points.is_empty());
        assert_eq!(parsed.anomalies, vec![RowAnomaly::TimestampOverflow { line: 9 }]);
    }

    #[test]
    fn accepts_integral_float_volume() {
        assert_eq!(parse_volume("1200"), Some(1200));
        assert_eq!(parse_volume("1200.0"), Some(1200));
        assert_eq!(parse_volume("1200.5"), None);
        assert_eq!(parse_volume("1e30"), None);
    }
}
