//! Coverage diagnostics: how well a segment table tiles each subject's
//! follow-up window.

use std::collections::BTreeMap;

use tracing::warn;
use tvx_model::{SegmentTable, Subject, SubjectId};

use crate::day::Span;

/// Per-subject coverage of `[entry, exit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coverage {
    pub id: SubjectId,
    pub expected_days: i64,
    /// Distinct window days covered by at least one segment.
    pub covered_days: i64,
    pub gap_days: i64,
    /// Days covered more than once, counted once per extra covering segment.
    pub overlap_days: i64,
    /// Distinct days covered outside the window.
    pub outside_days: i64,
}

impl Coverage {
    pub fn percent_covered(&self) -> f64 {
        if self.expected_days == 0 {
            return 0.0;
        }
        100.0 * self.covered_days as f64 / self.expected_days as f64
    }

    /// True when segments tile the window exactly.
    pub fn is_exact(&self) -> bool {
        self.gap_days == 0 && self.overlap_days == 0 && self.outside_days == 0
    }
}

/// Coverage of every cohort member, in cohort order.
pub fn coverage(table: &SegmentTable, cohort: &[Subject]) -> Vec<Coverage> {
    let mut spans: BTreeMap<SubjectId, Vec<Span>> = BTreeMap::new();
    for row in &table.rows {
        spans
            .entry(row.id)
            .or_default()
            .push(Span::from_dates(row.start, row.stop));
    }

    let report: Vec<Coverage> = cohort
        .iter()
        .map(|subject| {
            let window = Span::from_dates(subject.entry, subject.exit);
            let mut own = spans.remove(&subject.id).unwrap_or_default();
            own.sort_unstable();
            let total: i64 = own.iter().map(|span| span.len()).sum();
            let union = union(&own);
            let union_days: i64 = union.iter().map(|span| span.len()).sum();
            let covered_days: i64 = union
                .iter()
                .filter_map(|span| span.intersect(window))
                .map(|span| span.len())
                .sum();
            Coverage {
                id: subject.id,
                expected_days: window.len(),
                covered_days,
                gap_days: window.len() - covered_days,
                overlap_days: total - union_days,
                outside_days: union_days - covered_days,
            }
        })
        .collect();

    let inexact = report.iter().filter(|c| !c.is_exact()).count();
    if inexact > 0 {
        warn!(subjects = inexact, "segments do not tile follow-up exactly");
    }
    report
}

/// Merge sorted spans that overlap or touch.
fn union(sorted: &[Span]) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::with_capacity(sorted.len());
    for span in sorted {
        if let Some(last) = out.last_mut()
            && span.start <= last.stop + 1
        {
            last.stop = last.stop.max(span.stop);
            continue;
        }
        out.push(*span);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tvx_model::{ColumnSpec, Segment, Value};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn table(rows: &[(u32, u32)]) -> SegmentTable {
        let mut table = SegmentTable::new(vec![ColumnSpec::categorical("x", 0)]);
        table.rows = rows
            .iter()
            .map(|(start, stop)| {
                Segment::new(SubjectId::new(1), date(*start), date(*stop), vec![Value::Code(0)])
            })
            .collect();
        table
    }

    fn cohort() -> Vec<Subject> {
        vec![Subject::new(1, date(1), date(31)).unwrap()]
    }

    #[test]
    fn test_exact_tiling() {
        let report = coverage(&table(&[(1, 10), (11, 31)]), &cohort());
        assert!(report[0].is_exact());
        assert_eq!(report[0].percent_covered(), 100.0);
    }

    #[test]
    fn test_gap_and_overlap_counted() {
        let report = coverage(&table(&[(1, 10), (8, 20)]), &cohort());
        assert_eq!(report[0].overlap_days, 3);
        assert_eq!(report[0].gap_days, 11);
        assert_eq!(report[0].covered_days, 20);
    }

    #[test]
    fn test_missing_subject_is_all_gap() {
        let report = coverage(&table(&[]), &cohort());
        assert_eq!(report[0].gap_days, 31);
        assert_eq!(report[0].percent_covered(), 0.0);
    }
}
