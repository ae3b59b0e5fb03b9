use std::path::Path;

use serde_json::{json, Value};
use stockviz_core::ComparisonConfig;

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::error::CliError;

pub fn run(args: &ConfigArgs, path: &Path) -> Result<Value, CliError> {
    let mut config = ComparisonConfig::load(path)?;

    match &args.command {
        ConfigCommand::Show => {}
        ConfigCommand::SetA { instrument } => {
            config.instrument_a = Some(instrument.clone());
            config.save(path)?;
        }
        ConfigCommand::SetB { instrument } => {
            config.instrument_b = Some(instrument.clone());
            config.save(path)?;
        }
        ConfigCommand::SetPeriods { periods } => {
            config.periods = periods.clone();
            config.save(path)?;
        }
    }

    Ok(view(&config, path))
}

fn view(config: &ComparisonConfig, path: &Path) -> Value {
    json!({
        "path": path.display().to_string(),
        "instrument_a": config.instrument_a.as_ref().map(ToString::to_string),
        "instrument_b": config.instrument_b.as_ref().map(ToString::to_string),
        "periods": config.periods.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_persist_between_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let set_a = ConfigArgs {
            command: ConfigCommand::SetA {
                instrument: "AAPL:NASDAQ".parse().expect("instrument"),
            },
        };
        let set_periods = ConfigArgs {
            command: ConfigCommand::SetPeriods {
                periods: vec!["3d".parse().expect("period")],
            },
        };

        run(&set_a, &path).expect("set-a");
        run(&set_periods, &path).expect("set-periods");
        let shown = run(
            &ConfigArgs {
                command: ConfigCommand::Show,
            },
            &path,
        )
        .expect("show");

        assert_eq!(shown["instrument_a"], "AAPL:NASDAQ");
        assert_eq!(shown["instrument_b"], Value::Null);
        assert_eq!(shown["periods"], json!(["3d"]));
    }
}
