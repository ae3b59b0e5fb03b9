use stockviz_core::pipeline::{ComparisonFailure, FailureKind};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] stockviz_core::ValidationError),

    #[error("no instrument {slot} given and none saved; pass --{slot} CODE:VENUE or run `stockviz config set-{slot}`")]
    MissingInstrument { slot: &'static str },

    #[error("{}", .0.user_message())]
    Comparison(ComparisonFailure),

    #[error(transparent)]
    Metrics(#[from] stockviz_core::MetricsError),

    #[error(transparent)]
    Config(#[from] stockviz_core::ConfigError),

    #[error(transparent)]
    Store(#[from] stockviz_store::StoreError),

    #[error("comparison worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::MissingInstrument { .. } => 2,
            Self::Comparison(failure) => match failure.kind() {
                FailureKind::Network => 3,
                FailureKind::InvalidInstrument => 2,
                FailureKind::Internal => 5,
            },
            Self::Metrics(_) | Self::Worker(_) => 5,
            Self::Serialization(_) => 4,
            Self::Store(_) => 6,
            Self::Config(_) => 7,
        }
    }
}

impl From<ComparisonFailure> for CliError {
    fn from(failure: ComparisonFailure) -> Self {
        Self::Comparison(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockviz_core::{FetchError, InstrumentRef, Period};

    fn failure(error: FetchError) -> CliError {
        CliError::from(ComparisonFailure { error })
    }

    #[test]
    fn fetch_failures_map_to_distinct_exit_codes() {
        let instrument = InstrumentRef::new("ZZZZ", "NYSE").expect("instrument");
        let period = Period::parse("1Y").expect("period");

        let network = failure(FetchError::Network {
            instrument: instrument.clone(),
            period: period.clone(),
            message: String::from("dns lookup failed"),
        });
        let invalid = failure(FetchError::EmptySeries { instrument, period });

        assert_eq!(network.exit_code(), 3);
        assert!(network.to_string().contains("connected to the internet"));
        assert_eq!(invalid.exit_code(), 2);
        assert!(invalid.to_string().contains("ZZZZ:NYSE"));
    }

    #[test]
    fn missing_instrument_points_at_config() {
        let error = CliError::MissingInstrument { slot: "b" };
        assert_eq!(error.exit_code(), 2);
        assert!(error.to_string().contains("set-b"));
    }
}
