//! Error types for table ingestion.

use std::path::PathBuf;

use thiserror::Error;
use tvx_model::{TvError, codes};

/// Errors that can occur while loading input tables.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// CSV file not found.
    #[error("CSV file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Failed to read file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === CSV Parsing Errors ===
    /// Malformed CSV record.
    #[error("failed to parse CSV {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV file is empty or has no usable rows.
    #[error("CSV file has no usable rows: {path}")]
    EmptyCsv { path: PathBuf },

    // === Content Errors ===
    /// Required column not found.
    #[error("required column '{column}' not found in {path}")]
    MissingColumn { column: String, path: PathBuf },

    /// Cell that cannot be parsed.
    #[error("invalid {field} value '{value}' in {path} line {line}")]
    InvalidValue {
        field: String,
        value: String,
        path: PathBuf,
        line: usize,
    },

    /// Record rejected by the data model.
    #[error(transparent)]
    Model(#[from] TvError),
}

impl IngestError {
    /// Stable numeric code, shared with the engine's error codes.
    pub fn code(&self) -> u16 {
        match self {
            Self::FileNotFound { .. } => codes::FILE_NOT_FOUND,
            Self::FileRead { .. } | Self::CsvParse { .. } => codes::IO,
            Self::EmptyCsv { .. } => codes::NO_VALID_ROWS,
            Self::MissingColumn { .. } => codes::MISSING_COLUMN,
            Self::InvalidValue { .. } => codes::INVALID_VALUE,
            Self::Model(err) => err.code(),
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
