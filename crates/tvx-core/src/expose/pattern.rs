//! Per-subject switching and time-in-state columns derived from the first
//! value column of a split table.

use tvx_model::{ColumnKind, ColumnSpec, PatternOptions, Result, SegmentTable, TvError, Value};

pub const SWITCHED_COLUMN: &str = "has_switched";
pub const PATTERN_COLUMN: &str = "switching_pattern";
pub const STATETIME_COLUMN: &str = "statetime";

pub(crate) fn add_pattern_columns(table: &mut SegmentTable, patterns: PatternOptions) -> Result<()> {
    let mut added = Vec::new();
    if patterns.switching {
        added.push(ColumnSpec::categorical(SWITCHED_COLUMN, 0));
    }
    if patterns.switching_detail {
        added.push(ColumnSpec {
            name: PATTERN_COLUMN.to_string(),
            kind: ColumnKind::Categorical,
            reference: Value::Missing,
        });
    }
    if patterns.statetime {
        added.push(ColumnSpec {
            name: STATETIME_COLUMN.to_string(),
            kind: ColumnKind::Level,
            reference: Value::Code(0),
        });
    }
    for column in &added {
        if table.column_index(&column.name).is_some() {
            return Err(TvError::OutputExists {
                name: column.name.clone(),
            });
        }
    }
    if table.columns.is_empty() {
        return Err(TvError::InvalidConfig(
            "pattern columns need an exposure column".to_string(),
        ));
    }

    for group in table.rows.chunk_by_mut(|a, b| a.id == b.id) {
        let mut seen: Vec<Value> = Vec::new();
        for row in group.iter() {
            if !seen.contains(&row.values[0]) {
                seen.push(row.values[0].clone());
            }
        }
        let pattern = seen
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("->");

        let mut run_days = 0;
        let mut previous: Option<Value> = None;
        for row in group.iter_mut() {
            let current = row.values[0].clone();
            run_days = if previous.as_ref() == Some(&current) {
                run_days + row.days()
            } else {
                row.days()
            };
            if patterns.switching {
                row.values.push(Value::Code(i64::from(seen.len() > 1)));
            }
            if patterns.switching_detail {
                row.values.push(Value::Text(pattern.clone()));
            }
            if patterns.statetime {
                row.values.push(Value::Code(run_days));
            }
            previous = Some(current);
        }
    }
    table.columns.extend(added);
    Ok(())
}
