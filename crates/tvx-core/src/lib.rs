//! Time-varying exposure engine.
//!
//! Turns a cohort of follow-up windows and raw exposure intervals into
//! per-subject partitions of `[entry, exit]`:
//!
//! - [`normalize`] validates and clips raw intervals
//! - [`expose`] splits follow-up into exposure segments
//! - [`merge`] intersects independently split tables
//! - [`splice_events`] cuts and flags segments at outcome dates
//! - [`attach_covariates`] carries per-subject covariates onto segments
//! - [`coverage`] checks that a table tiles each window exactly
//!
//! Every operation works one subject at a time and is a pure function of its
//! inputs.

pub mod covariates;
pub mod day;
pub mod diagnostics;
pub mod event;
pub mod expose;
pub mod merge;
pub mod normalize;

pub use covariates::attach_covariates;
pub use diagnostics::{Coverage, coverage};
pub use event::{EventResult, EventSummary, splice_events};
pub use expose::{ExposeResult, ExposeSummary, expose};
pub use merge::{MergeResult, MergeSummary, merge};
pub use normalize::{NormalizeReport, Normalized, normalize};
