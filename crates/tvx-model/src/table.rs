//! Segment tables: the long `(id, start, stop, columns...)` format shared by
//! the splitter, the merger and the event splicer.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TvError};
use crate::ids::SubjectId;

/// Reserved column names that value columns may not use.
pub const RESERVED_COLUMNS: [&str; 3] = ["id", "start", "stop"];

/// A single cell in a value column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Missing,
    Code(i64),
    Float(f64),
    /// Concurrently active codes, ascending.
    Codes(Vec<i64>),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Code(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<i64> {
        match self {
            Self::Code(value) => Some(*value),
            _ => None,
        }
    }

    /// Multiply a numeric value by `factor`. Non-numeric values are returned
    /// unchanged.
    pub fn scaled(&self, factor: f64) -> Self {
        match self {
            Self::Code(value) => Self::Float(*value as f64 * factor),
            Self::Float(value) => Self::Float(value * factor),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Code(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Codes(values) => {
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str("&")?;
                    }
                    write!(f, "{value}")?;
                }
                Ok(())
            }
            Self::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// How a column behaves when its segment is cut into pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Carried unchanged.
    #[default]
    Categorical,
    /// Additive quantity; rescaled by `piece_days / segment_days`.
    Amount,
    /// Continuous but non-additive; carried unchanged.
    Level,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    /// Value used for days the column has no segment for.
    pub reference: Value,
}

impl ColumnSpec {
    pub fn categorical(name: impl Into<String>, reference: i64) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical,
            reference: Value::Code(reference),
        }
    }

    pub fn amount(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Amount,
            reference: Value::Float(0.0),
        }
    }

    pub fn level(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Level,
            reference: Value::Float(0.0),
        }
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SubjectId,
    pub start: NaiveDate,
    pub stop: NaiveDate,
    pub values: Vec<Value>,
}

impl Segment {
    pub fn new(id: SubjectId, start: NaiveDate, stop: NaiveDate, values: Vec<Value>) -> Self {
        Self {
            id,
            start,
            stop,
            values,
        }
    }

    /// Length in days, both ends inclusive.
    pub fn days(&self) -> i64 {
        (self.stop - self.start).num_days() + 1
    }
}

/// Column specs plus rows sorted by `(id, start)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentTable {
    pub columns: Vec<ColumnSpec>,
    pub rows: Vec<Segment>,
}

impl SegmentTable {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-sensitive column lookup.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| TvError::MissingColumn {
            column: name.to_string(),
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Rows grouped by subject, in table order. Assumes rows are sorted.
    pub fn subjects(&self) -> impl Iterator<Item = &[Segment]> {
        self.rows.chunk_by(|a, b| a.id == b.id)
    }

    pub fn subject_count(&self) -> usize {
        self.subjects().count()
    }

    /// Sum of segment lengths over all rows.
    pub fn person_days(&self) -> i64 {
        self.rows.iter().map(Segment::days).sum()
    }

    /// Sort rows by `(id, start, stop)`.
    pub fn sort(&mut self) {
        self.rows
            .sort_by(|a, b| (a.id, a.start, a.stop).cmp(&(b.id, b.start, b.stop)));
    }

    /// Check that every row has one value per column, that `start <= stop`,
    /// and that rows of one subject are ordered and do not overlap. Gaps are
    /// allowed.
    pub fn check_partition(&self) -> Result<()> {
        let width = self.columns.len();
        for row in &self.rows {
            if row.values.len() != width {
                return Err(TvError::InvalidValue {
                    field: "row width".to_string(),
                    value: format!("{} (expected {width})", row.values.len()),
                });
            }
            if row.stop < row.start {
                return Err(TvError::InvalidPartition {
                    id: row.id,
                    start: row.start,
                });
            }
        }
        for pair in self.rows.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.id > next.id {
                return Err(TvError::InvalidPartition {
                    id: next.id,
                    start: next.start,
                });
            }
            if prev.id == next.id && next.start <= prev.stop {
                return Err(TvError::InvalidPartition {
                    id: next.id,
                    start: next.start,
                });
            }
        }
        Ok(())
    }
}
