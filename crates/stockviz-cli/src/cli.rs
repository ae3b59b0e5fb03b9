//! Command-line arguments for `stockviz`.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `compare` | Compare two instruments over one or more periods |
//! | `fetch` | Fetch one series (cache-aware) |
//! | `config` | Show or edit the saved comparison settings |
//! | `cache` | Inspect or clean the persistent series cache |
//!
//! ```bash
//! stockviz compare --a AAPL:NASDAQ --b MSFT:NASDAQ --period 1M --period 1Y --pretty
//! stockviz config set-periods 5d 3M 5Y
//! stockviz cache purge
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stockviz_core::fetcher::DEFAULT_BASE_URL;
use stockviz_core::http_client::DEFAULT_TIMEOUT_MS;
use stockviz_core::pipeline::DEFAULT_INTERVAL_SECS;
use stockviz_core::{InstrumentRef, Period};

#[derive(Debug, Parser)]
#[command(
    name = "stockviz",
    author,
    version,
    about = "Compare the price history of two instruments"
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Keep fetched series in memory only for this run.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    /// Per-request timeout in milliseconds.
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Price endpoint to query.
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Config file to use instead of `$STOCKVIZ_HOME/config.json`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare two instruments across periods.
    Compare(CompareArgs),
    /// Fetch a single series.
    Fetch(FetchArgs),
    /// Show or edit the saved comparison settings.
    Config(ConfigArgs),
    /// Maintain the persistent series cache.
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// First instrument as CODE:VENUE; defaults to the saved one.
    #[arg(long)]
    pub a: Option<InstrumentRef>,

    /// Second instrument as CODE:VENUE; defaults to the saved one.
    #[arg(long)]
    pub b: Option<InstrumentRef>,

    /// Period such as 5d, 1M or 10Y. Repeatable; defaults to the saved list.
    #[arg(long = "period")]
    pub periods: Vec<Period>,

    /// Seconds between points.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u32,

    /// Include every point's timestamp and close in the output.
    #[arg(long, default_value_t = false)]
    pub points: bool,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Instrument as CODE:VENUE.
    pub instrument: InstrumentRef,

    #[arg(long, default_value = "1M")]
    pub period: Period,

    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    pub interval: u32,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the saved settings.
    Show,
    /// Save the first instrument.
    SetA { instrument: InstrumentRef },
    /// Save the second instrument.
    SetB { instrument: InstrumentRef },
    /// Replace the saved period list.
    SetPeriods {
        #[arg(required = true, num_args = 1..)]
        periods: Vec<Period>,
    },
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Entry counts and per-entry expiry.
    Stats,
    /// Remove expired entries.
    Purge,
    /// Remove every entry.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compare_with_repeated_periods() {
        let cli = Cli::try_parse_from([
            "stockviz",
            "compare",
            "--a",
            "AAPL:NASDAQ",
            "--b",
            "MSFT:NASDAQ",
            "--period",
            "1M",
            "--period",
            "5Y",
            "--pretty",
        ])
        .expect("arguments should parse");

        assert!(cli.pretty);
        let Command::Compare(args) = cli.command else {
            panic!("expected compare command");
        };
        assert_eq!(args.a.expect("a").code(), "AAPL");
        assert_eq!(args.periods.len(), 2);
        assert_eq!(args.interval, DEFAULT_INTERVAL_SECS);
    }

    #[test]
    fn rejects_instrument_without_venue() {
        let error = Cli::try_parse_from(["stockviz", "fetch", "AAPL"]).expect_err("must fail");
        assert_eq!(error.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn set_periods_requires_a_value() {
        assert!(Cli::try_parse_from(["stockviz", "config", "set-periods"]).is_err());
        assert!(Cli::try_parse_from(["stockviz", "config", "set-periods", "3d", "1Y"]).is_ok());
    }
}
