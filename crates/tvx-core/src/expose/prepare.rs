//! Activation rules applied to one subject's intervals before overlap
//! resolution: same-code merging, then window, lag and washout shifts.

use tvx_model::ExposeOptions;

use crate::day::{Day, Span};
use crate::normalize::Exposure;

/// An interval as it takes part in resolution.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Active {
    pub span: Span,
    pub code: i64,
    /// Daily dose rate under the dose policy, zero otherwise.
    pub rate: f64,
    pub rank: Option<u32>,
    /// Start before any shift. Later starts win under layering.
    pub began: Day,
    pub order: usize,
}

/// Categorical code carried by an interval value, if it is integral.
pub(crate) fn code_of(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

pub(crate) fn prepare(intervals: &[Exposure], window: Span, options: &ExposeOptions) -> Vec<Active> {
    let actives: Vec<Active> = intervals
        .iter()
        .filter_map(|interval| activate(interval, options))
        .collect();
    let actives = if options.is_dose() {
        actives
    } else {
        merge_same_code(actives, options.merge)
    };
    actives
        .into_iter()
        .filter_map(|active| shift(active, window, options))
        .collect()
}

fn activate(interval: &Exposure, options: &ExposeOptions) -> Option<Active> {
    let (code, rate) = if options.is_dose() {
        if interval.value <= 0.0 {
            return None;
        }
        (1, interval.value / interval.span.len() as f64)
    } else {
        let code = code_of(interval.value)?;
        // Reference-coded records add nothing to the baseline state.
        if code == options.reference {
            return None;
        }
        (code, 0.0)
    };
    Some(Active {
        span: interval.span,
        code,
        rate,
        rank: interval.rank,
        began: interval.span.start,
        order: interval.order,
    })
}

/// Union same-code intervals whose gap `start2 - stop1 - 1` is at most
/// `threshold` days. Overlapping intervals have a negative gap and always
/// merge.
fn merge_same_code(mut actives: Vec<Active>, threshold: u32) -> Vec<Active> {
    actives.sort_by(|a, b| (a.code, a.span, a.order).cmp(&(b.code, b.span, b.order)));
    let threshold = i64::from(threshold);
    let mut merged: Vec<Active> = Vec::with_capacity(actives.len());
    for active in actives {
        if let Some(last) = merged.last_mut()
            && last.code == active.code
            && active.span.start - last.span.stop - 1 <= threshold
        {
            last.span.stop = last.span.stop.max(active.span.stop);
            last.rank = match (last.rank, active.rank) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            continue;
        }
        merged.push(active);
    }
    merged.sort_by(|a, b| (a.span.start, a.order).cmp(&(b.span.start, b.order)));
    merged
}

/// Apply `window`, `lag` and `washout`. Returns `None` when nothing of the
/// interval remains active.
fn shift(mut active: Active, window: Span, options: &ExposeOptions) -> Option<Active> {
    let origin = active.began;
    if let Some(acute) = options.window {
        active.span = Span::new(
            origin + i64::from(acute.min),
            active.span.stop.min(origin + i64::from(acute.max)),
        );
    }
    if options.lag > 0 {
        active.span.start = active.span.start.max(origin + i64::from(options.lag));
    }
    if active.span.is_empty() {
        return None;
    }
    if options.washout > 0 {
        active.span.stop = (active.span.stop + i64::from(options.washout)).min(window.stop);
    }
    Some(active)
}
