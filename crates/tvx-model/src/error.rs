//! Error types for the exposure engine.
//!
//! Every variant maps onto a stable numeric code so callers (and scripts
//! wrapping the CLI) can tell configuration problems from data problems
//! without parsing messages.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::ids::SubjectId;

/// Stable error codes.
pub mod codes {
    /// Input file does not exist.
    pub const FILE_NOT_FOUND: u16 = 601;
    /// Required column missing from an input table.
    pub const MISSING_COLUMN: u16 = 111;
    /// Invalid or contradictory options.
    pub const INVALID_CONFIG: u16 = 198;
    /// Input contained no usable rows.
    pub const NO_VALID_ROWS: u16 = 2000;
    /// Output column name or output file already taken.
    pub const OUTPUT_EXISTS: u16 = 110;
    /// Cell value could not be interpreted.
    pub const INVALID_VALUE: u16 = 109;
    /// Inconsistent subject windows or partitions.
    pub const INCONSISTENT_DATA: u16 = 459;
    /// Read/write failure.
    pub const IO: u16 = 603;
}

/// Errors raised by the engine.
#[derive(Debug, Error)]
pub enum TvError {
    // === Configuration Errors ===
    /// Options are invalid or mutually exclusive.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An output column name collides with an existing one.
    #[error("variable '{name}' already exists")]
    OutputExists { name: String },

    /// The output file exists and overwriting was not requested.
    #[error("output file {} already exists (use --replace to overwrite)", path.display())]
    OutputFileExists { path: PathBuf },

    /// A required column is not present in a table.
    #[error("required column '{column}' not found")]
    MissingColumn { column: String },

    // === Data Errors ===
    /// The input had nothing to process.
    #[error("no valid rows: {0}")]
    NoValidRows(String),

    /// A value could not be used as given.
    #[error("invalid {field} value '{value}'")]
    InvalidValue { field: String, value: String },

    /// A subject's exit precedes its entry.
    #[error("subject {id}: exit {exit} precedes entry {entry}")]
    InvalidWindow {
        id: SubjectId,
        entry: NaiveDate,
        exit: NaiveDate,
    },

    /// The same subject appears twice in a cohort.
    #[error("subject {id} appears more than once in the cohort")]
    DuplicateSubject { id: SubjectId },

    /// Segments of one subject overlap or are out of order.
    #[error("subject {id}: segment starting {start} overlaps the previous segment")]
    InvalidPartition { id: SubjectId, start: NaiveDate },

    /// A subject is missing from one of the merged tables.
    #[error("subject {id} is missing from table {table}")]
    IdMismatch { id: SubjectId, table: usize },
}

impl TvError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> u16 {
        match self {
            Self::InvalidConfig(_) => codes::INVALID_CONFIG,
            Self::OutputExists { .. } | Self::OutputFileExists { .. } => codes::OUTPUT_EXISTS,
            Self::MissingColumn { .. } => codes::MISSING_COLUMN,
            Self::NoValidRows(_) => codes::NO_VALID_ROWS,
            Self::InvalidValue { .. } => codes::INVALID_VALUE,
            Self::InvalidWindow { .. }
            | Self::DuplicateSubject { .. }
            | Self::InvalidPartition { .. }
            | Self::IdMismatch { .. } => codes::INCONSISTENT_DATA,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type Result<T> = std::result::Result<T, TvError>;
