//! Polars export.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tvx_model::{ColumnKind, SegmentTable, Value};

use crate::common::format_value;

static MISSING: Value = Value::Missing;

/// Days since 1970-01-01, the physical representation of a Polars `Date`.
fn epoch_days(date: NaiveDate) -> i32 {
    const UNIX_EPOCH_CE: i32 = 719_163;
    date.num_days_from_ce() - UNIX_EPOCH_CE
}

fn date_column(name: &str, dates: impl Iterator<Item = NaiveDate>) -> Result<Column> {
    let days: Vec<i32> = dates.map(epoch_days).collect();
    let series = Series::new(name.into(), days)
        .cast(&DataType::Date)
        .with_context(|| format!("cast {name} to date"))?;
    Ok(series.into())
}

/// Polars type a value column is exported as.
enum ExportType {
    Int,
    Float,
    Date,
    Text,
}

fn export_type(kind: ColumnKind, values: &[&Value]) -> ExportType {
    if kind != ColumnKind::Categorical {
        return ExportType::Float;
    }
    let (mut numeric, mut fractional, mut dates) = (false, false, false);
    for value in values {
        match value {
            Value::Missing => {}
            Value::Code(_) => numeric = true,
            Value::Float(_) => {
                numeric = true;
                fractional = true;
            }
            Value::Date(_) => dates = true,
            Value::Codes(_) | Value::Text(_) => return ExportType::Text,
        }
    }
    match (dates, numeric, fractional) {
        (true, true, _) => ExportType::Text,
        (true, false, _) => ExportType::Date,
        (false, _, true) => ExportType::Float,
        (false, _, false) => ExportType::Int,
    }
}

/// Convert a segment table to a `DataFrame` with `id` (Int64), `start` and
/// `stop` (Date) and one column per value column. Categorical columns are
/// Int64 unless they hold fractions (Float64) or code sets and labels
/// (String). Missing cells are null.
pub fn to_dataframe(table: &SegmentTable) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(3 + table.columns.len());
    let ids: Vec<i64> = table.rows.iter().map(|row| row.id.get()).collect();
    columns.push(Series::new("id".into(), ids).into());
    columns.push(date_column("start", table.rows.iter().map(|row| row.start))?);
    columns.push(date_column("stop", table.rows.iter().map(|row| row.stop))?);

    for (idx, spec) in table.columns.iter().enumerate() {
        let cells: Vec<&Value> = table
            .rows
            .iter()
            .map(|row| row.values.get(idx).unwrap_or(&MISSING))
            .collect();
        let name = spec.name.as_str();
        let series = match export_type(spec.kind, &cells) {
            ExportType::Int => {
                let values: Vec<Option<i64>> = cells.iter().map(|v| v.as_code()).collect();
                Series::new(name.into(), values)
            }
            ExportType::Float => {
                let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
                Series::new(name.into(), values)
            }
            ExportType::Date => {
                let days: Vec<Option<i32>> = cells
                    .iter()
                    .map(|v| match v {
                        Value::Date(date) => Some(epoch_days(*date)),
                        _ => None,
                    })
                    .collect();
                Series::new(name.into(), days)
                    .cast(&DataType::Date)
                    .with_context(|| format!("cast {name} to date"))?
            }
            ExportType::Text => {
                let values: Vec<Option<String>> = cells
                    .iter()
                    .map(|v| match v {
                        Value::Missing => None,
                        other => Some(format_value(other)),
                    })
                    .collect();
                Series::new(name.into(), values)
            }
        };
        columns.push(series.into());
    }

    DataFrame::new(columns).context("build segment dataframe")
}
