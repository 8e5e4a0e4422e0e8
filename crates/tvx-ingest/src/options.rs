//! Reading options and column mappings.

use serde::{Deserialize, Serialize};
use tvx_model::{Result, TvError};

/// How a numeric day count with a fractional part becomes a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FractionalDays {
    /// Drop the fraction.
    #[default]
    Floor,
    /// Round half away from zero.
    Round,
    /// Treat the cell as invalid.
    Reject,
}

/// Options shared by every loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub fractional: FractionalDays,
    pub delimiter: char,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            fractional: FractionalDays::Floor,
            delimiter: ',',
        }
    }
}

impl IngestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fractional(mut self, fractional: FractionalDays) -> Self {
        self.fractional = fractional;
        self
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(TvError::InvalidConfig(format!(
                "delimiter '{}' must be a single ASCII character other than a quote or newline",
                self.delimiter.escape_default()
            )));
        }
        Ok(())
    }

    pub(crate) fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter as u8
    }
}

/// Column names of the cohort file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortColumns {
    pub id: String,
    pub entry: String,
    pub exit: String,
}

impl Default for CohortColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            entry: "entry".to_string(),
            exit: "exit".to_string(),
        }
    }
}

/// Column names of an exposure interval file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalColumns {
    pub id: String,
    pub start: String,
    /// `None` reads start-only (point-in-time) records.
    pub stop: Option<String>,
    pub value: String,
    pub rank: Option<String>,
}

impl Default for IntervalColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            start: "start".to_string(),
            stop: Some("stop".to_string()),
            value: "value".to_string(),
            rank: None,
        }
    }
}

impl IntervalColumns {
    #[must_use]
    pub fn point_time(mut self) -> Self {
        self.stop = None;
        self
    }
}

/// Column names of an event file.
///
/// With `wide_prefix` set, every column named `<prefix><n>` holds one
/// recurring event date and `dates` is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventColumns {
    pub id: String,
    pub dates: Vec<String>,
    pub wide_prefix: Option<String>,
    pub competing: Vec<String>,
}

impl Default for EventColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            dates: vec!["date".to_string()],
            wide_prefix: None,
            competing: Vec::new(),
        }
    }
}

/// Column names of a segment file. Every column not named here, other
/// than the key columns, is read as a categorical value column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentColumns {
    pub id: String,
    pub start: String,
    pub stop: String,
    /// Dose-like columns rescaled when segments are cut. Names missing from
    /// a table are skipped.
    pub amounts: Vec<String>,
    /// Numeric columns carried unchanged into every piece.
    pub levels: Vec<String>,
    /// Reference value of categorical columns, used where a merged source
    /// does not cover a day.
    pub reference: i64,
}

impl Default for SegmentColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            start: "start".to_string(),
            stop: "stop".to_string(),
            amounts: Vec::new(),
            levels: Vec::new(),
            reference: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_validate() {
        IngestOptions::default().validate().unwrap();
        assert_eq!(IngestOptions::new().delimiter_byte(), b',');
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let err = IngestOptions::new().with_delimiter('§').validate().unwrap_err();
        assert_eq!(err.code(), 198);
    }

    #[test]
    fn test_point_time_columns() {
        let columns = IntervalColumns::default().point_time();
        assert!(columns.stop.is_none());
    }
}
