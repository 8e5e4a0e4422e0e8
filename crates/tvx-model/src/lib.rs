//! Data model for the time-varying exposure engine.
//!
//! - **records**: cohort windows, raw exposure intervals and event dates
//! - **table**: segment tables shared by every pipeline stage
//! - **covariates**: per-subject values carried onto every segment
//! - **options**: splitter, merger and event splicer configuration
//! - **error**: error type with stable numeric codes

pub mod covariates;
pub mod error;
pub mod ids;
pub mod options;
pub mod records;
pub mod table;

pub use covariates::Covariates;
pub use error::{Result, TvError, codes};
pub use ids::SubjectId;
pub use options::{
    DEFAULT_EXPOSURE_NAME, DEFAULT_FAILURE_NAME, ENTRY_COLUMN, EXIT_COLUMN, EventKind,
    EventOptions, ExposeOptions, ExposureDefinition, GraceSpec, MergeOptions, OverlapPolicy,
    PatternOptions, TiePolicy, TimeColumn, TimeUnit, Window,
};
pub use records::{EventRecord, RawInterval, Subject};
pub use table::{ColumnKind, ColumnSpec, RESERVED_COLUMNS, Segment, SegmentTable, Value};
