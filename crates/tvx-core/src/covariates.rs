//! Carry per-subject covariates onto segment rows.

use std::collections::BTreeSet;

use tracing::{debug, warn};
use tvx_model::{Covariates, RESERVED_COLUMNS, Result, SegmentTable, TvError, Value};

/// Append `covariates` as value columns of `table`. Every row of a subject
/// gets that subject's values; subjects without values get `Missing`.
///
/// A column that already exists fails with `OutputExists` unless `replace`
/// is set, in which case it is overwritten in place. Returns the number of
/// subjects in `table` with no covariate values.
///
/// # Errors
///
/// Fails on duplicate or reserved covariate names and on name collisions
/// without `replace`.
pub fn attach_covariates(
    table: &mut SegmentTable,
    covariates: &Covariates,
    replace: bool,
) -> Result<usize> {
    let mut names = BTreeSet::new();
    for spec in &covariates.columns {
        if RESERVED_COLUMNS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(&spec.name))
        {
            return Err(TvError::InvalidConfig(format!(
                "'{}' cannot be kept as a covariate",
                spec.name
            )));
        }
        if !names.insert(spec.name.as_str()) {
            return Err(TvError::InvalidConfig(format!(
                "covariate '{}' listed twice",
                spec.name
            )));
        }
    }

    let mut targets = Vec::with_capacity(covariates.columns.len());
    for spec in &covariates.columns {
        match table.column_index(&spec.name) {
            Some(_) if !replace => {
                return Err(TvError::OutputExists {
                    name: spec.name.clone(),
                });
            }
            Some(idx) => {
                debug!(column = %spec.name, "replacing existing column with covariate");
                table.columns[idx] = spec.clone();
                targets.push(idx);
            }
            None => {
                table.columns.push(spec.clone());
                for row in &mut table.rows {
                    row.values.push(Value::Missing);
                }
                targets.push(table.columns.len() - 1);
            }
        }
    }

    let mut without = 0usize;
    for group in table.rows.chunk_by_mut(|a, b| a.id == b.id) {
        let values = covariates.get(group[0].id);
        if values.is_none() {
            without += 1;
        }
        for row in group.iter_mut() {
            for (pos, &idx) in targets.iter().enumerate() {
                row.values[idx] = values.map_or(Value::Missing, |values| values[pos].clone());
            }
        }
    }
    if without > 0 {
        warn!(subjects = without, "subjects without covariate values");
    }
    debug!(
        columns = covariates.columns.len(),
        subjects = covariates.subjects(),
        "attached covariates"
    );
    Ok(without)
}
