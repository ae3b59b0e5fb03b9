use serde_json::Value;
use stockviz_core::{ComparisonRequest, ComparisonResult};

use crate::cli::{Cli, FetchArgs};
use crate::error::CliError;

use super::{build_pipeline, run_on_worker};

/// One series through the same cache-aware path a comparison uses.
pub async fn run(args: &FetchArgs, cli: &Cli) -> Result<Value, CliError> {
    let request = ComparisonRequest::new(
        args.instrument.clone(),
        args.instrument.clone(),
        vec![args.period.clone()],
        args.interval,
    )?;

    match run_on_worker(&build_pipeline(cli), request).await? {
        ComparisonResult::Success { pairs } => {
            let series = pairs.into_iter().next().map(|pair| pair.a);
            Ok(serde_json::to_value(series)?)
        }
        ComparisonResult::Failure(failure) => Err(failure.into()),
    }
}
