//! Interval normalization: validate, clip and sort raw intervals against each
//! subject's observation window.
//!
//! Row-level problems never fail the run. Reversed intervals, intervals that
//! fall outside the window and intervals for unknown subjects are dropped and
//! counted; a subject left without intervals is simply unexposed.

use std::collections::BTreeMap;

use tracing::{debug, info, info_span, warn};
use tvx_model::{RawInterval, Result, Subject, SubjectId, TvError};

use crate::day::Span;

/// A clipped interval in day numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    pub span: Span,
    pub value: f64,
    pub rank: Option<u32>,
    /// Position in the input, used to break ties deterministically.
    pub order: usize,
}

/// One subject with its normalized intervals, sorted by `(start, stop, order)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectExposures {
    pub subject: Subject,
    pub window: Span,
    pub intervals: Vec<Exposure>,
}

/// Counts of what normalization kept and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub subjects: usize,
    pub kept: usize,
    /// Kept intervals that had to be clipped to the window.
    pub clipped: usize,
    pub reversed: usize,
    pub outside_window: usize,
    pub unmatched: usize,
    /// Subjects left with no intervals at all.
    pub unexposed_subjects: usize,
}

impl NormalizeReport {
    pub fn dropped(&self) -> usize {
        self.reversed + self.outside_window + self.unmatched
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Subjects in ascending id order.
    pub subjects: Vec<SubjectExposures>,
    pub report: NormalizeReport,
}

/// Normalize `intervals` against `cohort`.
///
/// # Errors
///
/// Fails on an empty cohort, a subject whose exit precedes entry, or a
/// duplicate subject id.
pub fn normalize(cohort: &[Subject], intervals: &[RawInterval]) -> Result<Normalized> {
    let span = info_span!("normalize", subjects = cohort.len(), intervals = intervals.len());
    let _guard = span.enter();

    if cohort.is_empty() {
        return Err(TvError::NoValidRows("cohort has no subjects".to_string()));
    }

    let mut by_id: BTreeMap<SubjectId, SubjectExposures> = BTreeMap::new();
    for subject in cohort {
        subject.validate()?;
        let entry = SubjectExposures {
            subject: *subject,
            window: Span::from_dates(subject.entry, subject.exit),
            intervals: Vec::new(),
        };
        if by_id.insert(subject.id, entry).is_some() {
            return Err(TvError::DuplicateSubject { id: subject.id });
        }
    }

    let mut report = NormalizeReport {
        subjects: by_id.len(),
        ..NormalizeReport::default()
    };

    for (order, raw) in intervals.iter().enumerate() {
        let Some(target) = by_id.get_mut(&raw.id) else {
            report.unmatched += 1;
            continue;
        };
        if raw.stop < raw.start {
            report.reversed += 1;
            debug!(id = %raw.id, start = %raw.start, stop = %raw.stop, "dropping reversed interval");
            continue;
        }
        let original = Span::from_dates(raw.start, raw.stop);
        let Some(clipped) = original.intersect(target.window) else {
            report.outside_window += 1;
            continue;
        };
        if clipped != original {
            report.clipped += 1;
        }
        report.kept += 1;
        target.intervals.push(Exposure {
            span: clipped,
            value: raw.value,
            rank: raw.rank,
            order,
        });
    }

    let mut subjects: Vec<SubjectExposures> = by_id.into_values().collect();
    for subject in &mut subjects {
        subject
            .intervals
            .sort_by(|a, b| (a.span, a.order).cmp(&(b.span, b.order)));
        if subject.intervals.is_empty() {
            report.unexposed_subjects += 1;
        }
    }

    if report.reversed > 0 {
        warn!(count = report.reversed, "dropped intervals with stop before start");
    }
    if report.unmatched > 0 {
        warn!(count = report.unmatched, "dropped intervals for subjects not in the cohort");
    }
    info!(
        kept = report.kept,
        clipped = report.clipped,
        outside_window = report.outside_window,
        dropped = report.dropped(),
        unexposed_subjects = report.unexposed_subjects,
        "normalization complete"
    );
    Ok(Normalized { subjects, report })
}
