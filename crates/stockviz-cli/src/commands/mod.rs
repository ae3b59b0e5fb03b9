mod cache;
mod compare;
mod config;
mod fetch;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use stockviz_core::{
    ComparisonPipeline, ComparisonRequest, ComparisonResult, FetcherConfig, GoogleFinanceFetcher,
    MemorySeriesCache, ReqwestHttpClient, SeriesCache,
};
use stockviz_store::SeriesStore;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Compare(args) => compare::run(args, cli).await,
        Command::Fetch(args) => fetch::run(args, cli).await,
        Command::Config(args) => config::run(args, &config_path(cli)),
        Command::Cache(args) => cache::run(args),
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(stockviz_core::config::default_path)
}

/// Persistent store unless `--no-cache`; an unopenable store degrades to memory.
fn build_cache(cli: &Cli) -> Arc<dyn SeriesCache> {
    if cli.no_cache {
        return Arc::new(MemorySeriesCache::default());
    }

    match SeriesStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(error) => {
            log::warn!("series store unavailable, caching in memory only: {error}");
            Arc::new(MemorySeriesCache::default())
        }
    }
}

fn build_pipeline(cli: &Cli) -> ComparisonPipeline {
    let fetcher = GoogleFinanceFetcher::new(
        Arc::new(ReqwestHttpClient::new()),
        FetcherConfig {
            base_url: cli.base_url.clone(),
            timeout_ms: cli.timeout_ms,
        },
    );
    ComparisonPipeline::new(Arc::new(fetcher), build_cache(cli))
}

/// Run `request` on a worker task and wait for its completion handler.
async fn run_on_worker(
    pipeline: &ComparisonPipeline,
    request: ComparisonRequest,
) -> Result<ComparisonResult, CliError> {
    let (sender, receiver) = tokio::sync::oneshot::channel();
    let handle = pipeline.spawn(request, move |result| {
        let _ = sender.send(result);
    });

    handle
        .await
        .map_err(|error| CliError::Worker(error.to_string()))?;
    receiver
        .await
        .map_err(|error| CliError::Worker(error.to_string()))
}
