//! Output for segment tables.
//!
//! - **CSV**: the long `id,start,stop,...` format with ISO dates
//! - **DataFrame**: Polars export with `Date` typed `start`/`stop`
//! - **Models**: the [`SegmentModel`] fit interface and [`RateTable`]

mod common;
mod csv;
mod frame;
pub mod model;

pub use common::{format_numeric, format_value};
pub use csv::{check_output, write_csv, write_csv_path};
pub use frame::to_dataframe;
pub use model::{RateRow, RateSummary, RateTable, SegmentModel};
