//! CSV ingestion for the exposure engine.
//!
//! This crate reads the four input tables:
//!
//! - **Cohort**: `id`, `entry`, `exit`
//! - **Intervals**: `id`, `start`, `stop` (optional), `value`, optional rank
//! - **Events**: `id`, one or more date columns, optional competing dates
//! - **Segments**: `id`, `start`, `stop` and value columns from a previous run
//!
//! Any of them can also supply per-subject covariates through
//! [`load_covariates`].
//!
//! Column names are configurable and matched case-insensitively after
//! trimming whitespace and a byte-order mark.
//!
//! # Example
//!
//! ```ignore
//! use tvx_ingest::{CohortColumns, IngestOptions, load_cohort};
//!
//! let subjects = load_cohort("cohort.csv".as_ref(), &CohortColumns::default(), &IngestOptions::default())?;
//! ```

pub mod csv;
pub mod dates;
pub mod error;
pub mod load;
pub mod options;

// === Error Types ===
pub use error::{IngestError, Result};

// === Options ===
pub use options::{
    CohortColumns, EventColumns, FractionalDays, IngestOptions, IntervalColumns, SegmentColumns,
};

// === Loaders ===
pub use dates::{DateCell, parse_date};
pub use load::{load_cohort, load_covariates, load_events, load_intervals, load_segments};
