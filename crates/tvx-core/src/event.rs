//! Event splicing: cut a split table at outcome dates and flag the segment
//! ending on each event.
//!
//! Boundary rules for an event on day `d` inside segment `[start, stop]`:
//! - `d == stop`: the segment is flagged as is;
//! - `d == start` with `start < stop`: the event belongs to the preceding
//!   interval, so nothing is flagged;
//! - otherwise the segment is cut at `d` and the event is recorded on the
//!   piece beginning at `d`.
//!
//! Single events censor follow-up: the flagged piece is `[d, d]` and later
//! segments are dropped. Recurring events cut into `[start, d-1]` and
//! `[d, stop]` and keep the whole timeline.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info, info_span, warn};
use tvx_model::{
    ColumnKind, ColumnSpec, EventKind, EventOptions, EventRecord, Result, Segment, SegmentTable,
    SubjectId, TiePolicy, TvError, Value,
};

/// Outcome counts after splicing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    pub rows: usize,
    /// Flagged rows per outcome code.
    pub flagged: BTreeMap<i64, usize>,
    /// Subjects whose follow-up was cut short by a single event.
    pub censored_subjects: usize,
    /// Event dates outside the subject's follow-up, or for unknown subjects.
    pub unmatched: usize,
    /// Event dates on the first day of a multi-day segment.
    pub at_segment_start: usize,
}

impl EventSummary {
    pub fn events(&self) -> usize {
        self.flagged.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct EventResult {
    pub table: SegmentTable,
    pub summary: EventSummary,
}

/// Splice `events` into `table`.
///
/// # Errors
///
/// Fails on invalid options, an existing flag or time column without
/// `replace`, competing dates with recurring events, or an input table that
/// is not a valid partition.
pub fn splice_events(
    table: &SegmentTable,
    events: &[EventRecord],
    options: &EventOptions,
) -> Result<EventResult> {
    options.validate()?;
    if options.kind == EventKind::Recurring && events.iter().any(EventRecord::has_competing) {
        return Err(TvError::InvalidConfig(
            "competing dates cannot be combined with recurring events".to_string(),
        ));
    }
    let span = info_span!("splice_events", kind = ?options.kind, events = events.len());
    let _guard = span.enter();

    let mut table = table.clone();
    table.sort();
    table.check_partition()?;
    let flag = prepare_columns(&mut table, options)?;

    let follow_up: BTreeMap<SubjectId, (NaiveDate, NaiveDate)> = table
        .subjects()
        .map(|rows| (rows[0].id, (rows[0].start, rows[rows.len() - 1].stop)))
        .collect();
    let mut summary = EventSummary::default();
    let outcomes = resolve_outcomes(events, &follow_up, options, &mut summary);

    let rows = std::mem::take(&mut table.rows);
    let mut spliced = Vec::with_capacity(rows.len());
    for group in rows.chunk_by(|a, b| a.id == b.id) {
        let id = group[0].id;
        match outcomes.get(&id) {
            Some(dates) => spliced.extend(splice_subject(
                group.to_vec(),
                dates,
                options.kind,
                flag,
                &table.columns,
                &mut summary,
            )?),
            None => spliced.extend_from_slice(group),
        }
    }
    table.rows = spliced;

    if let Some(timegen) = &options.timegen {
        table.columns.push(ColumnSpec::level(timegen.name.clone()));
        for row in &mut table.rows {
            row.values.push(Value::Float(timegen.unit.from_days(row.days())));
        }
    }

    summary.rows = table.len();
    for row in &table.rows {
        if let Value::Code(code) = row.values[flag]
            && code != 0
        {
            *summary.flagged.entry(code).or_default() += 1;
        }
    }
    if summary.unmatched > 0 {
        warn!(
            count = summary.unmatched,
            "event dates outside follow-up were ignored"
        );
    }
    info!(
        rows = summary.rows,
        events = summary.events(),
        censored_subjects = summary.censored_subjects,
        "event splicing complete"
    );
    Ok(EventResult { table, summary })
}

/// Drop replaced columns and append the flag column. Returns its index.
fn prepare_columns(table: &mut SegmentTable, options: &EventOptions) -> Result<usize> {
    let mut names = vec![options.generate.as_str()];
    if let Some(timegen) = &options.timegen {
        names.push(timegen.name.as_str());
    }
    for name in names {
        let Some(idx) = table.column_index(name) else {
            continue;
        };
        if !options.replace {
            return Err(TvError::OutputExists {
                name: name.to_string(),
            });
        }
        debug!(column = name, "replacing existing column");
        table.columns.remove(idx);
        for row in &mut table.rows {
            row.values.remove(idx);
        }
    }
    table
        .columns
        .push(ColumnSpec::categorical(options.generate.clone(), 0));
    for row in &mut table.rows {
        row.values.push(Value::Code(0));
    }
    Ok(table.columns.len() - 1)
}

/// Dated outcome codes per subject, ascending. Dates outside the subject's
/// follow-up, and all dates of unknown subjects, are counted as unmatched
/// and dropped first. Single events then keep only the earliest outcome:
/// primary dates carry code 1 and the `i`-th competing date code `i + 2`.
fn resolve_outcomes(
    events: &[EventRecord],
    follow_up: &BTreeMap<SubjectId, (NaiveDate, NaiveDate)>,
    options: &EventOptions,
    summary: &mut EventSummary,
) -> BTreeMap<SubjectId, Vec<(NaiveDate, i64)>> {
    let mut out: BTreeMap<SubjectId, Vec<(NaiveDate, i64)>> = BTreeMap::new();
    for record in events {
        let primary = record.dates.iter().map(|date| (*date, 1));
        let competing = record
            .competing
            .iter()
            .enumerate()
            .filter_map(|(idx, date)| date.map(|date| (date, idx as i64 + 2)));
        let Some(&(first, last)) = follow_up.get(&record.id) else {
            summary.unmatched += primary.chain(competing).count();
            continue;
        };
        let dates = out.entry(record.id).or_default();
        for (date, code) in primary.chain(competing) {
            if first <= date && date <= last {
                dates.push((date, code));
            } else {
                debug!(id = %record.id, %date, "event date outside follow-up");
                summary.unmatched += 1;
            }
        }
    }
    for dates in out.values_mut() {
        match options.kind {
            EventKind::Recurring => {
                dates.sort_unstable();
                dates.dedup_by_key(|(date, _)| *date);
            }
            EventKind::Single => {
                let tie = options.tie;
                let earliest = dates.iter().copied().min_by_key(|(date, code)| {
                    let preferred = match tie {
                        TiePolicy::CompetingWins => *code != 1,
                        TiePolicy::PrimaryWins => *code == 1,
                    };
                    (*date, !preferred, *code)
                });
                *dates = earliest.into_iter().collect();
            }
        }
    }
    out.retain(|_, dates| !dates.is_empty());
    out
}

fn splice_subject(
    mut rows: Vec<Segment>,
    outcomes: &[(NaiveDate, i64)],
    kind: EventKind,
    flag: usize,
    columns: &[ColumnSpec],
    summary: &mut EventSummary,
) -> Result<Vec<Segment>> {
    for &(date, code) in outcomes {
        let Some(idx) = rows
            .iter()
            .position(|row| row.start <= date && date <= row.stop)
        else {
            summary.unmatched += 1;
            continue;
        };
        let mut censored = false;
        let already_flagged = rows[idx].values[flag] != Value::Code(0);
        let hit = if date == rows[idx].stop && !(already_flagged && rows[idx].start < date) {
            idx
        } else if date == rows[idx].stop {
            // A recurring event at the stop of a piece flagged for an earlier
            // event gets its own one-day piece.
            let (lead, trail) = cut(&rows[idx], date, date, columns)?;
            rows.splice(idx..=idx, [lead, trail]);
            idx + 1
        } else if date == rows[idx].start {
            summary.at_segment_start += 1;
            continue;
        } else {
            let trail_stop = match kind {
                EventKind::Single => date,
                EventKind::Recurring => rows[idx].stop,
            };
            censored = trail_stop < rows[idx].stop;
            let (lead, trail) = cut(&rows[idx], date, trail_stop, columns)?;
            rows.splice(idx..=idx, [lead, trail]);
            idx + 1
        };
        rows[hit].values[flag] = Value::Code(code);
        if kind == EventKind::Single {
            if censored || rows.len() > hit + 1 {
                summary.censored_subjects += 1;
            }
            rows.truncate(hit + 1);
            break;
        }
    }
    Ok(rows)
}

/// Split `row` into `[start, at - 1]` and `[at, trail_stop]`.
fn cut(
    row: &Segment,
    at: NaiveDate,
    trail_stop: NaiveDate,
    columns: &[ColumnSpec],
) -> Result<(Segment, Segment)> {
    let lead_stop = at.pred_opt().ok_or_else(|| TvError::InvalidValue {
        field: "event date".to_string(),
        value: at.to_string(),
    })?;
    let total = row.days() as f64;
    let mut lead = row.clone();
    lead.stop = lead_stop;
    let mut trail = row.clone();
    trail.start = at;
    trail.stop = trail_stop;
    let lead_share = lead.days() as f64 / total;
    let trail_share = trail.days() as f64 / total;
    rescale(&mut lead, columns, lead_share);
    rescale(&mut trail, columns, trail_share);
    Ok((lead, trail))
}

fn rescale(row: &mut Segment, columns: &[ColumnSpec], factor: f64) {
    for (value, column) in row.values.iter_mut().zip(columns) {
        if column.kind == ColumnKind::Amount {
            *value = value.scaled(factor);
        }
    }
}
