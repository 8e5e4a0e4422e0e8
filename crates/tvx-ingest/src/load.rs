//! Loaders that turn CSV files into engine records.
//!
//! Rows with an empty required cell are skipped and counted; a cell that is
//! present but unreadable is an error.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDate;
use tvx_model::{
    ColumnKind, ColumnSpec, Covariates, EventRecord, RESERVED_COLUMNS, RawInterval, Segment,
    SegmentTable, Subject, SubjectId, Value,
};

use crate::csv::{CsvTable, read_csv_table};
use crate::dates::{DateCell, parse_date};
use crate::error::{IngestError, Result};
use crate::options::{CohortColumns, EventColumns, IngestOptions, IntervalColumns, SegmentColumns};

fn open(path: &Path, options: &IngestOptions) -> Result<CsvTable> {
    options.validate()?;
    read_csv_table(path, options.delimiter_byte())
}

fn read_id(table: &CsvTable, row: usize, column: usize) -> Result<Option<SubjectId>> {
    let raw = table.cell(row, column);
    if raw.is_empty() || raw == "." {
        return Ok(None);
    }
    raw.parse::<SubjectId>()
        .map(Some)
        .map_err(|_| table.invalid(row, "id", raw))
}

fn read_date(
    table: &CsvTable,
    row: usize,
    column: usize,
    field: &str,
    options: &IngestOptions,
) -> Result<Option<NaiveDate>> {
    let raw = table.cell(row, column);
    match parse_date(raw, options.fractional) {
        DateCell::Missing => Ok(None),
        DateCell::Date(date) => Ok(Some(date)),
        DateCell::Invalid => Err(table.invalid(row, field, raw)),
    }
}

fn read_number(table: &CsvTable, row: usize, column: usize, field: &str) -> Result<Option<f64>> {
    let raw = table.cell(row, column);
    if raw.is_empty() || raw == "." {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(table.invalid(row, field, raw)),
    }
}

fn finish<T>(table: &CsvTable, records: Vec<T>, skipped: usize, what: &str) -> Result<Vec<T>> {
    if skipped > 0 {
        tracing::warn!(
            path = %table.path.display(),
            skipped,
            "{what}: skipped rows with empty required cells"
        );
    }
    if records.is_empty() {
        return Err(IngestError::EmptyCsv {
            path: table.path.clone(),
        });
    }
    tracing::info!(path = %table.path.display(), rows = records.len(), "loaded {what}");
    Ok(records)
}

/// Load the cohort file. A window with `exit < entry` is an error.
pub fn load_cohort(
    path: &Path,
    columns: &CohortColumns,
    options: &IngestOptions,
) -> Result<Vec<Subject>> {
    let table = open(path, options)?;
    let id_col = table.require_column(&columns.id)?;
    let entry_col = table.require_column(&columns.entry)?;
    let exit_col = table.require_column(&columns.exit)?;

    let mut subjects = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in 0..table.len() {
        let id = read_id(&table, row, id_col)?;
        let entry = read_date(&table, row, entry_col, &columns.entry, options)?;
        let exit = read_date(&table, row, exit_col, &columns.exit, options)?;
        let (Some(id), Some(entry), Some(exit)) = (id, entry, exit) else {
            skipped += 1;
            continue;
        };
        subjects.push(Subject::new(id, entry, exit)?);
    }
    finish(&table, subjects, skipped, "cohort")
}

/// Load an exposure interval file. Without a stop column every record
/// covers its start day only.
pub fn load_intervals(
    path: &Path,
    columns: &IntervalColumns,
    options: &IngestOptions,
) -> Result<Vec<RawInterval>> {
    let table = open(path, options)?;
    let id_col = table.require_column(&columns.id)?;
    let start_col = table.require_column(&columns.start)?;
    let stop_col = columns
        .stop
        .as_deref()
        .map(|name| table.require_column(name))
        .transpose()?;
    let value_col = table.require_column(&columns.value)?;
    let rank_col = columns
        .rank
        .as_deref()
        .map(|name| table.require_column(name))
        .transpose()?;

    let mut intervals = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in 0..table.len() {
        let id = read_id(&table, row, id_col)?;
        let start = read_date(&table, row, start_col, &columns.start, options)?;
        let stop = match (stop_col, &columns.stop) {
            (Some(col), Some(name)) => read_date(&table, row, col, name, options)?,
            _ => start,
        };
        let value = read_number(&table, row, value_col, &columns.value)?;
        let (Some(id), Some(start), Some(stop), Some(value)) = (id, start, stop, value) else {
            skipped += 1;
            continue;
        };
        let mut interval = RawInterval::new(id, start, stop, value);
        if let Some(col) = rank_col {
            let raw = table.cell(row, col);
            if !raw.is_empty() {
                let rank = raw
                    .parse::<u32>()
                    .map_err(|_| table.invalid(row, "rank", raw))?;
                interval = interval.with_rank(rank);
            }
        }
        intervals.push(interval);
    }
    finish(&table, intervals, skipped, "intervals")
}

/// Columns `<prefix>1`, `<prefix>2`, ... in numeric order.
fn wide_columns(table: &CsvTable, prefix: &str) -> Vec<usize> {
    let prefix = prefix.to_ascii_lowercase();
    let mut found: Vec<(u32, usize)> = table
        .headers
        .iter()
        .enumerate()
        .filter_map(|(idx, header)| {
            let lower = header.to_ascii_lowercase();
            let suffix = lower.strip_prefix(&prefix)?;
            suffix.parse::<u32>().ok().map(|n| (n, idx))
        })
        .collect();
    found.sort_unstable();
    found.into_iter().map(|(_, idx)| idx).collect()
}

/// Load an event file. Rows with no dates at all are kept; they mark
/// subjects censored at their last segment.
pub fn load_events(
    path: &Path,
    columns: &EventColumns,
    options: &IngestOptions,
) -> Result<Vec<EventRecord>> {
    let table = open(path, options)?;
    let id_col = table.require_column(&columns.id)?;
    let date_cols: Vec<usize> = match &columns.wide_prefix {
        Some(prefix) => {
            let found = wide_columns(&table, prefix);
            if found.is_empty() {
                return Err(IngestError::MissingColumn {
                    column: format!("{prefix}1"),
                    path: table.path.clone(),
                });
            }
            found
        }
        None => columns
            .dates
            .iter()
            .map(|name| table.require_column(name))
            .collect::<Result<_>>()?,
    };
    let competing_cols: Vec<usize> = columns
        .competing
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<_>>()?;

    let mut events = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in 0..table.len() {
        let Some(id) = read_id(&table, row, id_col)? else {
            skipped += 1;
            continue;
        };
        let mut dates = Vec::with_capacity(date_cols.len());
        for &col in &date_cols {
            let field = table.headers[col].clone();
            if let Some(date) = read_date(&table, row, col, &field, options)? {
                dates.push(date);
            }
        }
        let mut record = EventRecord::recurring(id, dates);
        for &col in &competing_cols {
            let field = table.headers[col].clone();
            record = record.with_competing(read_date(&table, row, col, &field, options)?);
        }
        events.push(record);
    }
    finish(&table, events, skipped, "events")
}

fn parse_cell(raw: &str, kind: ColumnKind) -> Option<Value> {
    if raw.is_empty() || raw == "." {
        return Some(Value::Missing);
    }
    if kind != ColumnKind::Categorical {
        return raw
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(Value::Float);
    }
    if let Ok(code) = raw.parse::<i64>() {
        return Some(Value::Code(code));
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Some(Value::Float(value));
    }
    if raw.contains('&') {
        let codes: Option<Vec<i64>> = raw.split('&').map(|part| part.trim().parse().ok()).collect();
        if let Some(mut codes) = codes {
            codes.sort_unstable();
            codes.dedup();
            return Some(Value::Codes(codes));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Value::Date(date));
    }
    Some(Value::Text(raw.to_string()))
}

/// Load per-subject covariates: the `keep` columns of `path`, keyed by the
/// `id` column. The first row of each subject wins.
///
/// A column whose values include a fractional number is a level column;
/// any other column is categorical with a missing reference.
pub fn load_covariates(
    path: &Path,
    id: &str,
    keep: &[String],
    options: &IngestOptions,
) -> Result<Covariates> {
    let table = open(path, options)?;
    let id_col = table.require_column(id)?;
    let keep_cols: Vec<usize> = keep
        .iter()
        .map(|name| table.require_column(name))
        .collect::<Result<_>>()?;

    let mut rows = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in 0..table.len() {
        let Some(subject) = read_id(&table, row, id_col)? else {
            skipped += 1;
            continue;
        };
        let mut values = Vec::with_capacity(keep_cols.len());
        for (name, &col) in keep.iter().zip(&keep_cols) {
            let raw = table.cell(row, col);
            let value = parse_cell(raw, ColumnKind::Categorical)
                .ok_or_else(|| table.invalid(row, name, raw))?;
            values.push(value);
        }
        rows.push((subject, values));
    }
    let rows = finish(&table, rows, skipped, "covariates")?;

    let columns = keep
        .iter()
        .enumerate()
        .map(|(pos, name)| {
            let level = rows
                .iter()
                .any(|(_, values)| matches!(values[pos], Value::Float(_)));
            ColumnSpec {
                name: name.clone(),
                kind: if level {
                    ColumnKind::Level
                } else {
                    ColumnKind::Categorical
                },
                reference: Value::Missing,
            }
        })
        .collect::<Vec<_>>();
    let levels: Vec<bool> = columns
        .iter()
        .map(|column| column.kind == ColumnKind::Level)
        .collect();

    let mut covariates = Covariates::new(columns);
    let mut repeated = 0usize;
    for (subject, mut values) in rows {
        for (value, &level) in values.iter_mut().zip(&levels) {
            if !level {
                continue;
            }
            if let Value::Code(code) = *value {
                *value = Value::Float(code as f64);
            }
        }
        if !covariates.insert(subject, values)? {
            repeated += 1;
        }
    }
    if repeated > 0 {
        tracing::debug!(
            path = %table.path.display(),
            repeated,
            "covariates: later rows of a subject ignored"
        );
    }
    Ok(covariates)
}

/// Load a segment table written by an earlier run, sorted by `(id, start)`.
///
/// Amount and level names absent from the header are ignored, so one
/// `SegmentColumns` can describe several tables.
pub fn load_segments(
    path: &Path,
    columns: &SegmentColumns,
    options: &IngestOptions,
) -> Result<SegmentTable> {
    let table = open(path, options)?;
    let id_col = table.require_column(&columns.id)?;
    let start_col = table.require_column(&columns.start)?;
    let stop_col = table.require_column(&columns.stop)?;

    let keys: HashSet<usize> = [id_col, start_col, stop_col].into_iter().collect();
    let mut value_cols = Vec::new();
    let mut specs = Vec::new();
    for (idx, header) in table.headers.iter().enumerate() {
        if keys.contains(&idx) || header.is_empty() {
            continue;
        }
        if RESERVED_COLUMNS.iter().any(|r| r.eq_ignore_ascii_case(header)) {
            continue;
        }
        let matches = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(header));
        let spec = if matches(&columns.amounts) {
            ColumnSpec::amount(header.clone())
        } else if matches(&columns.levels) {
            ColumnSpec::level(header.clone())
        } else {
            ColumnSpec::categorical(header.clone(), columns.reference)
        };
        value_cols.push(idx);
        specs.push(spec);
    }

    let mut rows = Vec::with_capacity(table.len());
    let mut skipped = 0usize;
    for row in 0..table.len() {
        let id = read_id(&table, row, id_col)?;
        let start = read_date(&table, row, start_col, &columns.start, options)?;
        let stop = read_date(&table, row, stop_col, &columns.stop, options)?;
        let (Some(id), Some(start), Some(stop)) = (id, start, stop) else {
            skipped += 1;
            continue;
        };
        let mut values = Vec::with_capacity(value_cols.len());
        for (spec, &col) in specs.iter().zip(&value_cols) {
            let raw = table.cell(row, col);
            let value = parse_cell(raw, spec.kind)
                .ok_or_else(|| table.invalid(row, &spec.name, raw))?;
            values.push(value);
        }
        rows.push(Segment::new(id, start, stop, values));
    }
    let mut segments = SegmentTable::new(specs);
    segments.rows = finish(&table, rows, skipped, "segments")?;
    segments.sort();
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_kinds() {
        assert_eq!(parse_cell("", ColumnKind::Categorical), Some(Value::Missing));
        assert_eq!(parse_cell("2", ColumnKind::Categorical), Some(Value::Code(2)));
        assert_eq!(parse_cell("2", ColumnKind::Amount), Some(Value::Float(2.0)));
        assert_eq!(parse_cell("0.5", ColumnKind::Categorical), Some(Value::Float(0.5)));
        assert_eq!(
            parse_cell("3&1", ColumnKind::Categorical),
            Some(Value::Codes(vec![1, 3]))
        );
        assert_eq!(
            parse_cell("2020-03-01", ColumnKind::Categorical),
            Some(Value::Date(NaiveDate::from_ymd_opt(2020, 3, 1).unwrap()))
        );
        assert_eq!(
            parse_cell("1->2", ColumnKind::Categorical),
            Some(Value::Text("1->2".to_string()))
        );
        assert_eq!(parse_cell("n/a", ColumnKind::Level), None);
    }
}
