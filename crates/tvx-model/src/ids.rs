use std::fmt;
use std::str::FromStr;

use crate::TvError;

/// Integer subject key shared by cohort, interval, event and segment tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SubjectId(i64);

impl SubjectId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for SubjectId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for SubjectId {
    type Err = TvError;

    /// Accepts integers, and floats with no fractional part (`"12.0"`) as
    /// written by spreadsheet exports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return Ok(Self(value));
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() && value.fract() == 0.0 => Ok(Self(value as i64)),
            _ => Err(TvError::InvalidValue {
                field: "id".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
