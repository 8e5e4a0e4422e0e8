//! CSV writer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tvx_model::{RESERVED_COLUMNS, SegmentTable, TvError};

use crate::common::format_value;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Write `table` as CSV: `id,start,stop` followed by its value columns.
pub fn write_csv<W: Write>(table: &SegmentTable, writer: W) -> Result<()> {
    let mut out = ::csv::Writer::from_writer(writer);
    let header = RESERVED_COLUMNS
        .iter()
        .copied()
        .chain(table.column_names());
    out.write_record(header).context("write header")?;
    for row in &table.rows {
        let mut record = Vec::with_capacity(3 + row.values.len());
        record.push(row.id.to_string());
        record.push(row.start.format(DATE_FORMAT).to_string());
        record.push(row.stop.format(DATE_FORMAT).to_string());
        record.extend(row.values.iter().map(format_value));
        out.write_record(&record)
            .with_context(|| format!("write row for subject {}", row.id))?;
    }
    out.flush().context("flush csv output")?;
    Ok(())
}

/// Fail with [`TvError::OutputFileExists`] when `path` exists and
/// `overwrite` is not set.
pub fn check_output(path: &Path, overwrite: bool) -> Result<()> {
    if path.exists() && !overwrite {
        return Err(TvError::OutputFileExists {
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(())
}

/// Write `table` to `path`. An existing file is only replaced when
/// `overwrite` is set.
pub fn write_csv_path(table: &SegmentTable, path: &Path, overwrite: bool) -> Result<()> {
    check_output(path, overwrite)?;
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_csv(table, file).with_context(|| format!("write {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = table.len(), "wrote segment table");
    Ok(())
}
