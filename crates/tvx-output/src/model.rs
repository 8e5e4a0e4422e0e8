//! Fit interface for downstream models.
//!
//! Estimation lives outside this workspace. A model consumes a finished
//! segment table through [`SegmentModel`]; [`RateTable`] is the one built-in
//! consumer and doubles as a sanity check on event and exposure columns.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tvx_model::{ColumnKind, SegmentTable, Value};

use crate::common::format_value;

const DAYS_PER_YEAR: f64 = 365.25;

/// A model fitted on a segment table.
pub trait SegmentModel {
    type Output;

    fn fit(&self, table: &SegmentTable) -> Result<Self::Output>;
}

/// Crude event rates per level of a categorical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    /// Column whose levels define the strata.
    pub by: String,
    /// Event flag column; rows with this code count as events.
    pub event: String,
    pub event_code: i64,
}

impl RateTable {
    pub fn new(by: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            by: by.into(),
            event: event.into(),
            event_code: 1,
        }
    }

    #[must_use]
    pub fn with_event_code(mut self, code: i64) -> Self {
        self.event_code = code;
        self
    }
}

/// One stratum of a [`RateSummary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub level: String,
    pub segments: usize,
    pub events: usize,
    pub person_days: i64,
    pub person_years: f64,
    /// Events per 1,000 person-years.
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSummary {
    pub by: String,
    pub rows: Vec<RateRow>,
}

impl RateSummary {
    pub fn total_events(&self) -> usize {
        self.rows.iter().map(|row| row.events).sum()
    }

    pub fn total_person_days(&self) -> i64 {
        self.rows.iter().map(|row| row.person_days).sum()
    }
}

/// Sort key that orders integer levels numerically, then everything else
/// as text.
fn level_key(value: &Value) -> (u8, i64, String) {
    match value {
        Value::Code(code) => (0, *code, String::new()),
        Value::Missing => (2, 0, String::new()),
        other => (1, 0, format_value(other)),
    }
}

impl SegmentModel for RateTable {
    type Output = RateSummary;

    fn fit(&self, table: &SegmentTable) -> Result<RateSummary> {
        let by = table
            .require_column(&self.by)
            .with_context(|| format!("rate table stratum column '{}'", self.by))?;
        let event = table
            .require_column(&self.event)
            .with_context(|| format!("rate table event column '{}'", self.event))?;
        if table.columns[by].kind == ColumnKind::Amount {
            bail!("'{}' is a dose column and cannot define strata", self.by);
        }

        let mut strata: BTreeMap<(u8, i64, String), RateRow> = BTreeMap::new();
        for row in &table.rows {
            let (Some(level), Some(flag)) = (row.values.get(by), row.values.get(event)) else {
                continue;
            };
            let entry = strata.entry(level_key(level)).or_insert_with(|| RateRow {
                level: if matches!(level, Value::Missing) {
                    "(missing)".to_string()
                } else {
                    format_value(level)
                },
                segments: 0,
                events: 0,
                person_days: 0,
                person_years: 0.0,
                rate: 0.0,
            });
            entry.segments += 1;
            entry.person_days += row.days();
            if flag.as_code() == Some(self.event_code) {
                entry.events += 1;
            }
        }

        let rows = strata
            .into_values()
            .map(|mut row| {
                row.person_years = row.person_days as f64 / DAYS_PER_YEAR;
                row.rate = if row.person_years > 0.0 {
                    row.events as f64 / row.person_years * 1000.0
                } else {
                    0.0
                };
                row
            })
            .collect();
        tracing::debug!(by = %self.by, event = %self.event, "fitted rate table");
        Ok(RateSummary {
            by: self.by.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tvx_model::{ColumnSpec, Segment, SubjectId};

    fn segment(id: i64, start: (u32, u32), stop: (u32, u32), exposure: i64, flag: i64) -> Segment {
        let date = |(m, d): (u32, u32)| NaiveDate::from_ymd_opt(2021, m, d).unwrap();
        Segment::new(
            SubjectId::new(id),
            date(start),
            date(stop),
            vec![Value::Code(exposure), Value::Code(flag)],
        )
    }

    fn table() -> SegmentTable {
        let mut table = SegmentTable::new(vec![
            ColumnSpec::categorical("tv_exposure", 0),
            ColumnSpec::categorical("_failure", 0),
        ]);
        table.rows = vec![
            segment(1, (1, 1), (3, 31), 0, 0),
            segment(1, (4, 1), (6, 30), 10, 1),
            segment(2, (1, 1), (12, 31), 0, 2),
            segment(3, (1, 1), (12, 31), 2, 1),
        ];
        table
    }

    #[test]
    fn test_rates_by_level() {
        let summary = RateTable::new("tv_exposure", "_failure").fit(&table()).unwrap();
        let levels: Vec<&str> = summary.rows.iter().map(|r| r.level.as_str()).collect();
        assert_eq!(levels, vec!["0", "2", "10"]);
        assert_eq!(summary.rows[0].events, 0);
        assert_eq!(summary.rows[0].person_days, 90 + 365);
        assert_eq!(summary.rows[1].events, 1);
        assert!((summary.rows[1].rate - 1000.0 / (365.0 / 365.25)).abs() < 1e-9);
        assert_eq!(summary.total_events(), 2);
        assert_eq!(summary.total_person_days(), table().person_days());
    }

    #[test]
    fn test_competing_code() {
        let summary = RateTable::new("tv_exposure", "_failure")
            .with_event_code(2)
            .fit(&table())
            .unwrap();
        assert_eq!(summary.total_events(), 1);
        assert_eq!(summary.rows[0].events, 1);
    }

    #[test]
    fn test_missing_column() {
        let err = RateTable::new("drug", "_failure").fit(&table()).unwrap_err();
        assert!(format!("{err:#}").contains("drug"));
    }
}
