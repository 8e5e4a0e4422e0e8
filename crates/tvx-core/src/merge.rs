//! Partition merging: intersect independently split tables into one finer
//! partition per subject.
//!
//! Breakpoints are the union of every source's segment bounds. Each finer
//! piece takes its values from the covering segment of every source;
//! `Amount` columns are rescaled by `piece_days / source_days` so that each
//! source's total is conserved over any sub-range. Days a source does not
//! cover take that column's reference value.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, info_span, warn};
use tvx_model::{
    ColumnKind, ColumnSpec, MergeOptions, Result, Segment, SegmentTable, SubjectId, TvError, Value,
};

use crate::day::{Day, Span, to_date};

/// A subject's partition from one source, with the source's columns.
pub(crate) struct Layer<'a> {
    pub pieces: &'a [(Span, Vec<Value>)],
    pub columns: &'a [ColumnSpec],
}

/// Overlay `layers` for one subject. Pieces covered by no layer are skipped.
pub(crate) fn overlay(id: SubjectId, layers: &[Layer<'_>]) -> Result<Vec<Segment>> {
    let mut breaks: Vec<Day> = layers
        .iter()
        .flat_map(|layer| layer.pieces.iter())
        .flat_map(|(span, _)| [span.start, span.stop + 1])
        .collect();
    breaks.sort_unstable();
    breaks.dedup();

    let width = layers.iter().map(|layer| layer.columns.len()).sum();
    let mut cursors = vec![0usize; layers.len()];
    let mut rows = Vec::with_capacity(breaks.len());
    for pair in breaks.windows(2) {
        let piece = Span::new(pair[0], pair[1] - 1);
        let mut covered = false;
        let mut values = Vec::with_capacity(width);
        for (layer, cursor) in layers.iter().zip(cursors.iter_mut()) {
            while *cursor < layer.pieces.len() && layer.pieces[*cursor].0.stop < piece.start {
                *cursor += 1;
            }
            match layer.pieces.get(*cursor) {
                Some((span, source)) if span.start <= piece.start => {
                    covered = true;
                    let factor = piece.len() as f64 / span.len() as f64;
                    values.extend(layer.columns.iter().zip(source).map(|(column, value)| {
                        match column.kind {
                            ColumnKind::Amount => value.scaled(factor),
                            ColumnKind::Categorical | ColumnKind::Level => value.clone(),
                        }
                    }));
                }
                _ => values.extend(layer.columns.iter().map(|column| column.reference.clone())),
            }
        }
        if covered {
            rows.push(Segment::new(id, to_date(piece.start)?, to_date(piece.stop)?, values));
        }
    }
    Ok(rows)
}

/// Row statistics of a merged table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MergeSummary {
    pub persons: usize,
    pub rows: usize,
    pub mean_rows_per_person: f64,
    pub max_rows_per_person: usize,
    /// Subjects missing from at least one source.
    pub defaulted: usize,
}

#[derive(Debug, Clone)]
pub struct MergeResult {
    pub table: SegmentTable,
    pub summary: MergeSummary,
}

type Pieces = Vec<(Span, Vec<Value>)>;

/// Merge two or more split tables.
///
/// # Errors
///
/// Fails on fewer than two tables, a source that is not a valid partition,
/// renaming that does not fit the column count, duplicate output names, or a
/// subject missing from a source under `strict_ids`.
pub fn merge(tables: &[SegmentTable], options: &MergeOptions) -> Result<MergeResult> {
    options.validate()?;
    if tables.len() < 2 {
        return Err(TvError::InvalidConfig(format!(
            "merge needs at least two tables, got {}",
            tables.len()
        )));
    }
    let span = info_span!("merge", tables = tables.len());
    let _guard = span.enter();

    let columns = output_columns(tables, options)?;
    let sources: Vec<BTreeMap<SubjectId, Pieces>> = tables
        .iter()
        .map(by_subject)
        .collect::<Result<_>>()?;

    let ids: BTreeSet<SubjectId> = sources.iter().flat_map(|source| source.keys().copied()).collect();
    let mut table = SegmentTable::new(columns);
    let mut summary = MergeSummary::default();
    for id in ids {
        let mut missing = false;
        let mut layers = Vec::with_capacity(tables.len());
        for (idx, (source, input)) in sources.iter().zip(tables).enumerate() {
            let pieces: &[(Span, Vec<Value>)] = match source.get(&id) {
                Some(pieces) => pieces.as_slice(),
                None if options.strict_ids => {
                    return Err(TvError::IdMismatch { id, table: idx + 1 });
                }
                None => {
                    missing = true;
                    &[]
                }
            };
            layers.push(Layer {
                pieces,
                columns: &input.columns,
            });
        }
        if missing {
            summary.defaulted += 1;
            debug!(%id, "subject missing from a source; using reference values");
        }
        let rows = overlay(id, &layers)?;
        summary.max_rows_per_person = summary.max_rows_per_person.max(rows.len());
        table.rows.extend(rows);
    }

    summary.persons = table.subject_count();
    summary.rows = table.len();
    if summary.persons > 0 {
        summary.mean_rows_per_person = summary.rows as f64 / summary.persons as f64;
    }
    if summary.defaulted > 0 {
        warn!(
            count = summary.defaulted,
            "subjects missing from at least one source"
        );
    }
    info!(
        persons = summary.persons,
        rows = summary.rows,
        max_rows_per_person = summary.max_rows_per_person,
        "merge complete"
    );
    Ok(MergeResult { table, summary })
}

fn output_columns(tables: &[SegmentTable], options: &MergeOptions) -> Result<Vec<ColumnSpec>> {
    let mut columns: Vec<ColumnSpec> = tables
        .iter()
        .flat_map(|table| table.columns.iter().cloned())
        .collect();
    if !options.generate.is_empty() {
        if options.generate.len() != columns.len() {
            return Err(TvError::InvalidConfig(format!(
                "generate names {} columns but the sources have {}",
                options.generate.len(),
                columns.len()
            )));
        }
        for (column, name) in columns.iter_mut().zip(&options.generate) {
            column.name.clone_from(name);
        }
    } else if let Some(prefix) = &options.prefix {
        for column in &mut columns {
            column.name = format!("{prefix}{}", column.name);
        }
    }
    let mut seen = BTreeSet::new();
    for column in &columns {
        if !seen.insert(column.name.as_str()) {
            return Err(TvError::OutputExists {
                name: column.name.clone(),
            });
        }
    }
    Ok(columns)
}

fn by_subject(table: &SegmentTable) -> Result<BTreeMap<SubjectId, Pieces>> {
    let mut sorted = table.clone();
    sorted.sort();
    sorted.check_partition()?;
    let mut out: BTreeMap<SubjectId, Pieces> = BTreeMap::new();
    for row in sorted.rows {
        out.entry(row.id)
            .or_default()
            .push((Span::from_dates(row.start, row.stop), row.values));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn row(id: i64, start: u32, stop: u32, values: Vec<Value>) -> Segment {
        Segment::new(SubjectId::new(id), date(start), date(stop), values)
    }

    fn drug_a() -> SegmentTable {
        let mut table = SegmentTable::new(vec![ColumnSpec::categorical("drug_a", 0)]);
        table.rows = vec![
            row(1, 1, 10, vec![Value::Code(0)]),
            row(1, 11, 20, vec![Value::Code(1)]),
        ];
        table
    }

    fn dose_b() -> SegmentTable {
        let mut table = SegmentTable::new(vec![ColumnSpec::amount("dose_b")]);
        table.rows = vec![
            row(1, 1, 5, vec![Value::Float(0.0)]),
            row(1, 6, 20, vec![Value::Float(30.0)]),
        ];
        table
    }

    #[test]
    fn test_merge_refines_and_rescales() {
        let result = merge(&[drug_a(), dose_b()], &MergeOptions::new()).unwrap();
        let rows: Vec<(u32, u32, Vec<Value>)> = result
            .table
            .rows
            .iter()
            .map(|r| (r.start.day(), r.stop.day(), r.values.clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, 5, vec![Value::Code(0), Value::Float(0.0)]),
                (6, 10, vec![Value::Code(0), Value::Float(10.0)]),
                (11, 20, vec![Value::Code(1), Value::Float(20.0)]),
            ]
        );
        assert_eq!(result.summary.persons, 1);
        assert_eq!(result.summary.max_rows_per_person, 3);
    }

    #[test]
    fn test_missing_subject_uses_reference() {
        let mut b = dose_b();
        b.rows.push(row(2, 1, 31, vec![Value::Float(3.0)]));
        let result = merge(&[drug_a(), b], &MergeOptions::new()).unwrap();
        let last = result.table.rows.last().unwrap();
        assert_eq!(last.values, vec![Value::Code(0), Value::Float(3.0)]);
        assert_eq!(result.summary.defaulted, 1);
    }

    #[test]
    fn test_strict_ids_rejects_missing_subject() {
        let mut b = dose_b();
        b.rows.push(row(2, 1, 31, vec![Value::Float(3.0)]));
        let options = MergeOptions::new().with_strict_ids(true);
        let err = merge(&[drug_a(), b], &options).unwrap_err();
        assert!(matches!(err, TvError::IdMismatch { table: 1, .. }));
    }

    #[test]
    fn test_duplicate_names_need_prefix_or_generate() {
        let err = merge(&[drug_a(), drug_a()], &MergeOptions::new()).unwrap_err();
        assert_eq!(err.code(), 110);

        let options = MergeOptions::new().with_generate(vec!["a1".into(), "a2".into()]);
        let result = merge(&[drug_a(), drug_a()], &options).unwrap();
        assert_eq!(result.table.column_names().collect::<Vec<_>>(), vec!["a1", "a2"]);
    }

    #[test]
    fn test_generate_count_must_match() {
        let options = MergeOptions::new().with_generate(vec!["only".into()]);
        let err = merge(&[drug_a(), dose_b()], &options).unwrap_err();
        assert_eq!(err.code(), 198);
    }

    #[test]
    fn test_single_table_is_rejected() {
        let err = merge(&[drug_a()], &MergeOptions::new()).unwrap_err();
        assert_eq!(err.code(), 198);
    }

    #[test]
    fn test_overlapping_source_is_rejected() {
        let mut a = drug_a();
        a.rows.push(row(1, 15, 25, vec![Value::Code(1)]));
        assert!(merge(&[a, dose_b()], &MergeOptions::new()).is_err());
    }
}
