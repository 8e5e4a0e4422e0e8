//! Exposure splitting.
//!
//! Per subject the pipeline runs:
//! 1. activation (`prepare`): reference records dropped, same-code `merge`,
//!    then `window`, `lag` and `washout` shifts;
//! 2. resolution (`resolve`): sweep-line over breakpoints under the overlap
//!    policy, filling uncovered days with the reference state;
//! 3. `grace` bridging of short reference runs between equal codes;
//! 4. derived measures (`derive`), re-splitting at threshold crossings.
//!
//! Under `bytype` steps 1-4 run once per exposure code and the per-code
//! partitions are overlaid into parallel columns.

mod derive;
mod grace;
mod pattern;
mod prepare;
mod resolve;

use std::collections::BTreeSet;

use tracing::{debug, info, info_span};
use tvx_model::{
    ColumnKind, ColumnSpec, Covariates, ENTRY_COLUMN, EXIT_COLUMN, ExposeOptions, RawInterval,
    Result, Segment, SegmentTable, Subject, TvError, Value,
};

use crate::covariates::attach_covariates;

use crate::day::{Span, to_date};
use crate::merge::{Layer, overlay};
use crate::normalize::{Exposure, NormalizeReport, SubjectExposures, normalize};

pub use pattern::{PATTERN_COLUMN, STATETIME_COLUMN, SWITCHED_COLUMN};

/// Totals over a split table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExposeSummary {
    pub persons: usize,
    pub segments: usize,
    pub person_days: i64,
    /// Days whose first exposure column differs from its reference value.
    pub non_reference_days: i64,
}

#[derive(Debug, Clone)]
pub struct ExposeResult {
    pub table: SegmentTable,
    pub report: NormalizeReport,
    pub summary: ExposeSummary,
}

/// Split every cohort member's follow-up into exposure segments.
///
/// # Errors
///
/// Fails on invalid options, an empty or malformed cohort, a non-integral
/// categorical exposure value, or a negative or non-finite dose.
pub fn expose(
    cohort: &[Subject],
    intervals: &[RawInterval],
    options: &ExposeOptions,
) -> Result<ExposeResult> {
    options.validate()?;
    check_values(intervals, options)?;
    let span = info_span!(
        "expose",
        overlap = ?options.overlap,
        definition = options.definition.stub(),
        bytype = options.bytype
    );
    let _guard = span.enter();

    let normalized = normalize(cohort, intervals)?;

    let codes = if options.bytype {
        distinct_codes(&normalized.subjects, options.reference)
    } else {
        Vec::new()
    };
    let columns: Vec<ColumnSpec> = if options.bytype {
        codes
            .iter()
            .map(|code| derive::column_for(options, &bytype_name(options.stub(), *code)))
            .collect()
    } else {
        vec![derive::column_for(options, &options.generate)]
    };
    if options.bytype {
        debug!(codes = ?codes, "tracking exposure codes separately");
    }

    let mut table = SegmentTable::new(columns);
    for subject in &normalized.subjects {
        let rows = if options.bytype {
            split_by_type(subject, &codes, &table.columns, options)?
        } else {
            split_subject(subject, options)?
        };
        debug!(id = %subject.subject.id, segments = rows.len(), "subject split");
        table.rows.extend(rows);
    }
    if options.patterns.any() {
        pattern::add_pattern_columns(&mut table, options.patterns)?;
    }
    if options.keep_dates {
        add_window_columns(&mut table, &normalized.subjects)?;
    }

    let summary = summarize(&table);
    info!(
        persons = summary.persons,
        segments = summary.segments,
        person_days = summary.person_days,
        non_reference_days = summary.non_reference_days,
        "split complete"
    );
    Ok(ExposeResult {
        table,
        report: normalized.report,
        summary,
    })
}

fn check_values(intervals: &[RawInterval], options: &ExposeOptions) -> Result<()> {
    for interval in intervals {
        let valid = if options.is_dose() {
            interval.value.is_finite() && interval.value >= 0.0
        } else {
            prepare::code_of(interval.value).is_some()
        };
        if !valid {
            return Err(TvError::InvalidValue {
                field: (if options.is_dose() { "dose" } else { "exposure" }).to_string(),
                value: interval.value.to_string(),
            });
        }
    }
    Ok(())
}

fn partition(
    subject: &SubjectExposures,
    intervals: &[Exposure],
    options: &ExposeOptions,
) -> Vec<(Span, Value)> {
    let actives = prepare::prepare(intervals, subject.window, options);
    let resolved = resolve::resolve(subject.window, &actives, options);
    let bridged = grace::bridge(resolved, options);
    derive::derive(&bridged, options)
}

fn split_subject(subject: &SubjectExposures, options: &ExposeOptions) -> Result<Vec<Segment>> {
    partition(subject, &subject.intervals, options)
        .into_iter()
        .map(|(span, value)| {
            Ok(Segment::new(
                subject.subject.id,
                to_date(span.start)?,
                to_date(span.stop)?,
                vec![value],
            ))
        })
        .collect()
}

fn split_by_type(
    subject: &SubjectExposures,
    codes: &[i64],
    columns: &[ColumnSpec],
    options: &ExposeOptions,
) -> Result<Vec<Segment>> {
    if codes.is_empty() {
        let window = subject.window;
        return Ok(vec![Segment::new(
            subject.subject.id,
            to_date(window.start)?,
            to_date(window.stop)?,
            Vec::new(),
        )]);
    }
    let per_code: Vec<Vec<(Span, Vec<Value>)>> = codes
        .iter()
        .map(|code| {
            let own: Vec<Exposure> = subject
                .intervals
                .iter()
                .filter(|interval| prepare::code_of(interval.value) == Some(*code))
                .cloned()
                .collect();
            partition(subject, &own, options)
                .into_iter()
                .map(|(span, value)| (span, vec![value]))
                .collect()
        })
        .collect();
    let layers: Vec<Layer<'_>> = per_code
        .iter()
        .zip(columns.chunks(1))
        .map(|(pieces, columns)| Layer { pieces, columns })
        .collect();
    overlay(subject.subject.id, &layers)
}

fn distinct_codes(subjects: &[SubjectExposures], reference: i64) -> Vec<i64> {
    let codes: BTreeSet<i64> = subjects
        .iter()
        .flat_map(|subject| subject.intervals.iter())
        .filter_map(|interval| prepare::code_of(interval.value))
        .filter(|code| *code != reference)
        .collect();
    codes.into_iter().collect()
}

/// `stub` followed by the code, with a leading minus spelled `neg`.
fn bytype_name(stub: &str, code: i64) -> String {
    if code < 0 {
        format!("{stub}neg{}", code.unsigned_abs())
    } else {
        format!("{stub}{code}")
    }
}

/// Entry and exit dates of each subject on every row.
fn add_window_columns(table: &mut SegmentTable, subjects: &[SubjectExposures]) -> Result<()> {
    let date_column = |name: &str| ColumnSpec {
        name: name.to_string(),
        kind: ColumnKind::Categorical,
        reference: Value::Missing,
    };
    let mut dates = Covariates::new(vec![date_column(ENTRY_COLUMN), date_column(EXIT_COLUMN)]);
    for subject in subjects {
        let Subject { id, entry, exit } = subject.subject;
        dates.insert(id, vec![Value::Date(entry), Value::Date(exit)])?;
    }
    attach_covariates(table, &dates, false)?;
    Ok(())
}

fn summarize(table: &SegmentTable) -> ExposeSummary {
    let non_reference_days = table.columns.first().map_or(0, |column| {
        table
            .rows
            .iter()
            .filter(|row| row.values[0] != column.reference)
            .map(Segment::days)
            .sum()
    });
    ExposeSummary {
        persons: table.subject_count(),
        segments: table.len(),
        person_days: table.person_days(),
        non_reference_days,
    }
}
