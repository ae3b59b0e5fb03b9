//! Two-instrument comparison.

use serde::Serialize;
use serde_json::Value;
use stockviz_core::{
    ComparisonConfig, ComparisonRequest, ComparisonResult, ComparisonSummary, SeriesPair,
    SideSummary, TimeSeries, UtcDateTime, Winner,
};

use crate::cli::{Cli, CompareArgs};
use crate::error::CliError;

use super::{build_pipeline, config_path, run_on_worker};

#[derive(Debug, Serialize)]
struct CompareResponse {
    instrument_a: String,
    instrument_b: String,
    interval_secs: u32,
    periods: Vec<PeriodView>,
}

#[derive(Debug, Serialize)]
struct PeriodView {
    period: String,
    a: SideView,
    b: SideView,
    winner: Winner,
}

#[derive(Debug, Serialize)]
struct SideView {
    points: usize,
    open: f64,
    close: f64,
    change: f64,
    pct_change: Option<f64>,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    series: Option<Vec<ClosePoint>>,
}

#[derive(Debug, Serialize)]
struct ClosePoint {
    ts: UtcDateTime,
    close: f64,
}

pub async fn run(args: &CompareArgs, cli: &Cli) -> Result<Value, CliError> {
    let request = build_request(args, &ComparisonConfig::load(&config_path(cli))?)?;
    let pipeline = build_pipeline(cli);

    let pairs = match run_on_worker(&pipeline, request.clone()).await? {
        ComparisonResult::Success { pairs } => pairs,
        ComparisonResult::Failure(failure) => return Err(failure.into()),
    };

    let periods = pairs
        .iter()
        .map(|pair| -> Result<PeriodView, CliError> {
            let summary = pair.summarize()?;
            Ok(period_view(pair, &summary, args.points))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(serde_json::to_value(CompareResponse {
        instrument_a: request.instrument_a.to_string(),
        instrument_b: request.instrument_b.to_string(),
        interval_secs: request.interval_secs,
        periods,
    })?)
}

/// Explicit arguments win; anything omitted comes from the saved config.
fn build_request(
    args: &CompareArgs,
    saved: &ComparisonConfig,
) -> Result<ComparisonRequest, CliError> {
    let instrument_a = args
        .a
        .clone()
        .or_else(|| saved.instrument_a.clone())
        .ok_or(CliError::MissingInstrument { slot: "a" })?;
    let instrument_b = args
        .b
        .clone()
        .or_else(|| saved.instrument_b.clone())
        .ok_or(CliError::MissingInstrument { slot: "b" })?;
    let periods = if args.periods.is_empty() {
        saved.periods.clone()
    } else {
        args.periods.clone()
    };
    for period in periods.iter().filter(|period| !period.is_preset()) {
        log::warn!("period {period} is not a standard preset; the upstream may return no data");
    }

    Ok(ComparisonRequest::new(
        instrument_a,
        instrument_b,
        periods,
        args.interval,
    )?)
}

fn period_view(pair: &SeriesPair, summary: &ComparisonSummary, with_points: bool) -> PeriodView {
    let side = |series: &TimeSeries, summary: &SideSummary| SideView {
        points: series.len(),
        open: summary.open,
        close: summary.close,
        change: summary.change,
        pct_change: summary.pct_change.value(),
        label: summary.display(),
        series: with_points.then(|| {
            series
                .points()
                .iter()
                .map(|point| ClosePoint {
                    ts: point.timestamp,
                    close: point.close,
                })
                .collect()
        }),
    };

    PeriodView {
        period: pair.period.to_string(),
        a: side(&pair.a, &summary.a),
        b: side(&pair.b, &summary.b),
        winner: summary.winner,
    }
}
