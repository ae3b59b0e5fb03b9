use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Unit letter of a period label. `M` is months; labels are case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodUnit {
    Days,
    Months,
    Years,
}

impl PeriodUnit {
    const fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'd' => Some(Self::Days),
            'M' => Some(Self::Months),
            'Y' => Some(Self::Years),
            _ => None,
        }
    }
}

/// Requested span of history, passed through to the upstream `p` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    label: String,
    count: u32,
    unit: PeriodUnit,
}

impl Period {
    /// Period labels offered for selection.
    pub const PRESETS: [&'static str; 25] = [
        "3d", "4d", "5d", "6d", "7d", "14d", "21d", "1M", "2M", "3M", "4M", "5M", "6M", "7M",
        "8M", "9M", "10M", "11M", "1Y", "2Y", "3Y", "4Y", "5Y", "6Y", "7Y",
    ];

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let label = input.trim();
        let invalid = || ValidationError::InvalidPeriod {
            value: input.to_owned(),
        };

        let mut chars = label.chars();
        let unit = chars
            .next_back()
            .and_then(PeriodUnit::from_letter)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u32 = digits.parse().map_err(|_| invalid())?;
        if count == 0 {
            return Err(invalid());
        }

        Ok(Self {
            label: label.to_owned(),
            count,
            unit,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }

    pub const fn count(&self) -> u32 {
        self.count
    }

    pub const fn unit(&self) -> PeriodUnit {
        self.unit
    }

    pub fn is_preset(&self) -> bool {
        Self::PRESETS.contains(&self.label.as_str())
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for Period {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.label
    }
}
