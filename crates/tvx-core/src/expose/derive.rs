//! Derived exposure measures computed over a subject's resolved partition.
//!
//! Every measure sweeps the partition chronologically with a running metric
//! and re-splits pieces wherever the metric crosses a threshold, so each
//! output segment carries one constant value.

use tvx_model::{ColumnSpec, ExposeOptions, ExposureDefinition, TimeUnit, Value};

use crate::day::{Day, Span, collapse};
use crate::expose::resolve::State;

/// Column metadata for the measure selected by `options`.
pub(crate) fn column_for(options: &ExposeOptions, name: &str) -> ColumnSpec {
    match &options.definition {
        ExposureDefinition::TimeVarying if options.is_dose() => ColumnSpec::amount(name),
        ExposureDefinition::TimeVarying => ColumnSpec::categorical(name, options.reference),
        ExposureDefinition::Continuous { .. } => ColumnSpec::level(name),
        ExposureDefinition::CumulativeDose { cuts } if cuts.is_empty() => ColumnSpec::level(name),
        _ => ColumnSpec::categorical(name, 0),
    }
}

pub(crate) fn derive(pieces: &[(Span, State)], options: &ExposeOptions) -> Vec<(Span, Value)> {
    let reference = options.reference;
    match &options.definition {
        ExposureDefinition::TimeVarying => pieces
            .iter()
            .map(|(span, state)| (*span, state.to_value(*span)))
            .collect(),
        ExposureDefinition::EverTreated => collapse(ever_treated(pieces, reference)),
        ExposureDefinition::CurrentFormer => collapse(current_former(pieces, reference)),
        ExposureDefinition::Duration { thresholds, unit } => {
            let cuts: Vec<i64> = thresholds.iter().map(|t| unit.threshold_days(*t)).collect();
            collapse(duration(pieces, reference, &cuts))
        }
        ExposureDefinition::Continuous { unit } => continuous(pieces, reference, *unit),
        ExposureDefinition::Recency { thresholds } => {
            let cuts: Vec<i64> = thresholds
                .iter()
                .map(|t| TimeUnit::Years.threshold_days(*t))
                .collect();
            collapse(recency(pieces, reference, &cuts))
        }
        ExposureDefinition::CumulativeDose { cuts } if cuts.is_empty() => cumulative_dose(pieces),
        ExposureDefinition::CumulativeDose { cuts } => collapse(dose_categories(pieces, cuts)),
    }
}

fn ever_treated(pieces: &[(Span, State)], reference: i64) -> Vec<(Span, Value)> {
    let mut ever = false;
    pieces
        .iter()
        .map(|(span, state)| {
            ever |= state.is_exposed(reference);
            (*span, Value::Code(i64::from(ever)))
        })
        .collect()
}

fn current_former(pieces: &[(Span, State)], reference: i64) -> Vec<(Span, Value)> {
    let mut seen = false;
    pieces
        .iter()
        .map(|(span, state)| {
            let code = if state.is_exposed(reference) {
                seen = true;
                1
            } else if seen {
                2
            } else {
                0
            };
            (*span, Value::Code(code))
        })
        .collect()
}

/// Category of a running total against ascending cut points: 0 when nothing
/// has accrued, otherwise one more than the number of cuts reached.
fn category<T: PartialOrd + Default>(total: T, cuts: &[T]) -> i64 {
    if total <= T::default() {
        return 0;
    }
    1 + cuts.iter().filter(|cut| total >= **cut).count() as i64
}

/// Cumulative exposed days include the current day, so day `d` of an exposed
/// piece starting at `s` with `cum` prior days has total `cum + d - s + 1`.
fn duration(pieces: &[(Span, State)], reference: i64, cuts: &[i64]) -> Vec<(Span, Value)> {
    let mut out = Vec::with_capacity(pieces.len());
    let mut cum: i64 = 0;
    for (span, state) in pieces {
        if !state.is_exposed(reference) {
            out.push((*span, Value::Code(category(cum, cuts))));
            continue;
        }
        let crossings = cuts.iter().map(|t| span.start + (t - cum) - 1);
        for piece in span.split_at(crossings) {
            let total = cum + piece.start - span.start + 1;
            out.push((piece, Value::Code(category(total, cuts))));
        }
        cum += span.len();
    }
    out
}

fn continuous(pieces: &[(Span, State)], reference: i64, unit: TimeUnit) -> Vec<(Span, Value)> {
    let mut cum: i64 = 0;
    pieces
        .iter()
        .map(|(span, state)| {
            if state.is_exposed(reference) {
                cum += span.len();
            }
            (*span, Value::Float(unit.from_days(cum)))
        })
        .collect()
}

fn recency(pieces: &[(Span, State)], reference: i64, cuts: &[i64]) -> Vec<(Span, Value)> {
    let mut out = Vec::with_capacity(pieces.len());
    let mut last: Option<Day> = None;
    for (span, state) in pieces {
        if state.is_exposed(reference) {
            out.push((*span, Value::Code(1)));
            last = Some(span.stop);
            continue;
        }
        let Some(last) = last else {
            out.push((*span, Value::Code(0)));
            continue;
        };
        for piece in span.split_at(cuts.iter().map(|t| last + t)) {
            let since = piece.start - last;
            let reached = cuts.iter().filter(|t| since >= **t).count() as i64;
            out.push((piece, Value::Code(2 + reached)));
        }
    }
    out
}

fn cumulative_dose(pieces: &[(Span, State)]) -> Vec<(Span, Value)> {
    let mut cum = 0.0;
    pieces
        .iter()
        .map(|(span, state)| {
            cum += state.rate() * span.len() as f64;
            (*span, Value::Float(cum))
        })
        .collect()
}

fn dose_categories(pieces: &[(Span, State)], cuts: &[f64]) -> Vec<(Span, Value)> {
    let mut out = Vec::with_capacity(pieces.len());
    let mut cum = 0.0;
    for (span, state) in pieces {
        let rate = state.rate();
        if rate <= 0.0 {
            out.push((*span, Value::Code(category(cum, cuts))));
            continue;
        }
        let crossings: Vec<Day> = cuts
            .iter()
            .filter(|cut| **cut > cum)
            .filter_map(|cut| crossing_day(cum, rate, *cut, *span))
            .collect();
        for piece in span.split_at(crossings) {
            let total = cum + (piece.start - span.start + 1) as f64 * rate;
            out.push((piece, Value::Code(category(total, cuts))));
        }
        cum += span.len() as f64 * rate;
    }
    out
}

/// First day of `span` on which `cum + k * rate` reaches `cut`, where `k`
/// counts days from the span start inclusive.
fn crossing_day(cum: f64, rate: f64, cut: f64, span: Span) -> Option<Day> {
    let total = |k: i64| cum + k as f64 * rate;
    let mut k = ((cut - cum) / rate).ceil().max(1.0) as i64;
    while k > 1 && total(k - 1) >= cut {
        k -= 1;
    }
    while k <= span.len() && total(k) < cut {
        k += 1;
    }
    (k <= span.len()).then(|| span.start + k - 1)
}
