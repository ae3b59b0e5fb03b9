use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream identifier for one tradable instrument: a code listed on a venue.
///
/// Both parts are opaque to the pipeline; construction only trims whitespace
/// and rejects empty values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInstrument", into = "RawInstrument")]
pub struct InstrumentRef {
    code: String,
    venue: String,
}

impl InstrumentRef {
    pub fn new(code: &str, venue: &str) -> Result<Self, ValidationError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ValidationError::EmptyInstrumentCode);
        }

        let venue = venue.trim();
        if venue.is_empty() {
            return Err(ValidationError::EmptyVenue);
        }

        Ok(Self {
            code: code.to_owned(),
            venue: venue.to_owned(),
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }
}

impl Display for InstrumentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.code, self.venue)
    }
}

/// Parses the `CODE:VENUE` form used on the command line.
impl FromStr for InstrumentRef {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((code, venue)) = value.split_once(':') else {
            return Err(ValidationError::InvalidInstrumentSpec {
                value: value.to_owned(),
            });
        };
        Self::new(code, venue)
    }
}

#[derive(Serialize, Deserialize)]
struct RawInstrument {
    code: String,
    venue: String,
}

impl TryFrom<RawInstrument> for InstrumentRef {
    type Error = ValidationError;

    fn try_from(value: RawInstrument) -> Result<Self, Self::Error> {
        Self::new(&value.code, &value.venue)
    }
}

impl From<InstrumentRef> for RawInstrument {
    fn from(value: InstrumentRef) -> Self {
        Self {
            code: value.code,
            venue: value.venue,
        }
    }
}
