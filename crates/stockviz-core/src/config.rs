//! Saved comparison settings.
//!
//! The document keeps the historical `config.json` shape so existing files
//! load unchanged:
//!
//! ```json
//! {
//!   "stock_1": { "code": "AAPL", "index": "NASDAQ" },
//!   "stock_2": { "code": "MSFT", "index": "NASDAQ" },
//!   "time_periods": ["1M", "6M", "1Y"]
//! }
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::ComparisonRequest;
use crate::{InstrumentRef, Period, ValidationError};

pub const HOME_ENV: &str = "STOCKVIZ_HOME";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_PERIODS: [&str; 3] = ["1M", "6M", "1Y"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config at {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StockEntry {
    #[serde(default)]
    code: String,
    #[serde(default)]
    index: String,
}

impl StockEntry {
    fn from_instrument(instrument: Option<&InstrumentRef>) -> Self {
        instrument
            .map(|instrument| Self {
                code: instrument.code().to_owned(),
                index: instrument.venue().to_owned(),
            })
            .unwrap_or_default()
    }

    fn into_instrument(self) -> Result<Option<InstrumentRef>, ValidationError> {
        if self.code.trim().is_empty() && self.index.trim().is_empty() {
            return Ok(None);
        }
        InstrumentRef::new(&self.code, &self.index).map(Some)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    stock_1: StockEntry,
    #[serde(default)]
    stock_2: StockEntry,
    #[serde(default = "default_period_labels")]
    time_periods: Vec<String>,
}

fn default_period_labels() -> Vec<String> {
    DEFAULT_PERIODS.iter().map(|label| (*label).to_owned()).collect()
}

/// Instruments and periods used when a comparison names none explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonConfig {
    pub instrument_a: Option<InstrumentRef>,
    pub instrument_b: Option<InstrumentRef>,
    pub periods: Vec<Period>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            instrument_a: None,
            instrument_b: None,
            periods: DEFAULT_PERIODS
                .iter()
                .filter_map(|label| Period::parse(label).ok())
                .collect(),
        }
    }
}

impl ComparisonConfig {
    /// Read the config at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let document: ConfigDocument =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_document(document)
    }

    /// Write the config as pretty JSON, replacing the old file atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let mut text = serde_json::to_string_pretty(&self.to_document()).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        text.push('\n');

        let staging = path.with_extension("json.tmp");
        fs::write(&staging, text).map_err(io_error)?;
        fs::rename(&staging, path).map_err(io_error)?;
        log::debug!("saved config to {}", path.display());
        Ok(())
    }

    /// Build a request; both instruments must be set.
    pub fn to_request(&self, interval_secs: u32) -> Result<ComparisonRequest, ConfigError> {
        let instrument_a = self
            .instrument_a
            .clone()
            .ok_or(ValidationError::EmptyInstrumentCode)?;
        let instrument_b = self
            .instrument_b
            .clone()
            .ok_or(ValidationError::EmptyInstrumentCode)?;

        Ok(ComparisonRequest::new(
            instrument_a,
            instrument_b,
            self.periods.clone(),
            interval_secs,
        )?)
    }

    fn from_document(document: ConfigDocument) -> Result<Self, ConfigError> {
        let periods = document
            .time_periods
            .iter()
            .map(|label| Period::parse(label))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            instrument_a: document.stock_1.into_instrument()?,
            instrument_b: document.stock_2.into_instrument()?,
            periods,
        })
    }

    fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            stock_1: StockEntry::from_instrument(self.instrument_a.as_ref()),
            stock_2: StockEntry::from_instrument(self.instrument_b.as_ref()),
            time_periods: self
                .periods
                .iter()
                .map(|period| period.as_str().to_owned())
                .collect(),
        }
    }
}

/// `$STOCKVIZ_HOME`, else `$HOME/.stockviz`, else `./.stockviz`.
pub fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os(HOME_ENV) {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".stockviz");
    }

    PathBuf::from(".stockviz")
}

pub fn default_path() -> PathBuf {
    resolve_home().join(CONFIG_FILE_NAME)
}
