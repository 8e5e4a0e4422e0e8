//! Sweep-line overlap resolution.
//!
//! Breakpoints are the window bounds plus every active start and `stop + 1`.
//! Between consecutive breakpoints the set of covering intervals is constant,
//! so each elementary interval is resolved once and equal neighbors are
//! collapsed afterwards.

use std::cmp::Reverse;

use tvx_model::{ExposeOptions, OverlapPolicy, Value};

use crate::day::{Day, Span, collapse};
use crate::expose::prepare::Active;

/// Resolved state of an elementary interval.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum State {
    Code(i64),
    /// Several codes active at once under the split policy, ascending.
    Codes(Vec<i64>),
    /// Summed daily dose rate.
    Rate(f64),
}

impl State {
    pub fn is_exposed(&self, reference: i64) -> bool {
        match self {
            Self::Code(code) => *code != reference,
            Self::Codes(codes) => !codes.is_empty(),
            Self::Rate(rate) => *rate > 0.0,
        }
    }

    pub fn rate(&self) -> f64 {
        match self {
            Self::Rate(rate) => *rate,
            _ => 0.0,
        }
    }

    /// Value written for a segment covering `span`. Dose states become the
    /// amount delivered over the span.
    pub fn to_value(&self, span: Span) -> Value {
        match self {
            Self::Code(code) => Value::Code(*code),
            Self::Codes(codes) => Value::Codes(codes.clone()),
            Self::Rate(rate) => Value::Float(rate * span.len() as f64),
        }
    }
}

pub(crate) fn resolve(window: Span, actives: &[Active], options: &ExposeOptions) -> Vec<(Span, State)> {
    let mut breaks: Vec<Day> = Vec::with_capacity(actives.len() * 2 + 2);
    breaks.push(window.start);
    breaks.push(window.stop + 1);
    for active in actives {
        breaks.push(active.span.start.max(window.start));
        breaks.push(active.span.stop.min(window.stop) + 1);
    }
    breaks.sort_unstable();
    breaks.dedup();

    let mut by_start: Vec<&Active> = actives.iter().collect();
    by_start.sort_by_key(|active| (active.span.start, active.order));

    let mut next = 0;
    let mut live: Vec<&Active> = Vec::new();
    let mut pieces = Vec::with_capacity(breaks.len());
    for pair in breaks.windows(2) {
        let elementary = Span::new(pair[0], pair[1] - 1);
        if elementary.start < window.start || elementary.stop > window.stop {
            continue;
        }
        while next < by_start.len() && by_start[next].span.start <= elementary.start {
            live.push(by_start[next]);
            next += 1;
        }
        live.retain(|active| active.span.stop >= elementary.start);
        pieces.push((elementary, pick(&live, options)));
    }
    collapse(pieces)
}

fn pick(live: &[&Active], options: &ExposeOptions) -> State {
    let reference = State::Code(options.reference);
    match &options.overlap {
        OverlapPolicy::Dose => State::Rate(live.iter().map(|active| active.rate).sum()),
        OverlapPolicy::Split => {
            let mut codes: Vec<i64> = live.iter().map(|active| active.code).collect();
            codes.sort_unstable();
            codes.dedup();
            match codes.as_slice() {
                [] => reference,
                [code] => State::Code(*code),
                _ => State::Codes(codes),
            }
        }
        OverlapPolicy::Layer => live
            .iter()
            .max_by_key(|active| (active.began, active.order))
            .map_or(reference, |active| State::Code(active.code)),
        OverlapPolicy::Priority(order) => live
            .iter()
            .min_by_key(|active| {
                let rank = if order.is_empty() {
                    active.rank.map_or(u64::MAX, u64::from)
                } else {
                    order
                        .iter()
                        .position(|code| *code == active.code)
                        .unwrap_or(order.len()) as u64
                };
                (rank, Reverse(active.began), Reverse(active.order))
            })
            .map_or(reference, |active| State::Code(active.code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active(start: Day, stop: Day, code: i64, order: usize) -> Active {
        Active {
            span: Span::new(start, stop),
            code,
            rate: 0.0,
            rank: None,
            began: start,
            order,
        }
    }

    fn codes(pieces: &[(Span, State)]) -> Vec<(Day, Day, State)> {
        pieces
            .iter()
            .map(|(span, state)| (span.start, span.stop, state.clone()))
            .collect()
    }

    const WINDOW: Span = Span::new(1, 100);

    #[test]
    fn test_no_intervals_is_one_reference_piece() {
        let pieces = resolve(WINDOW, &[], &ExposeOptions::new());
        assert_eq!(codes(&pieces), vec![(1, 100, State::Code(0))]);
    }

    #[test]
    fn test_layer_later_start_wins_then_resumes() {
        let actives = [active(10, 50, 1, 0), active(20, 30, 2, 1)];
        let pieces = resolve(WINDOW, &actives, &ExposeOptions::new());
        assert_eq!(
            codes(&pieces),
            vec![
                (1, 9, State::Code(0)),
                (10, 19, State::Code(1)),
                (20, 30, State::Code(2)),
                (31, 50, State::Code(1)),
                (51, 100, State::Code(0)),
            ]
        );
    }

    #[test]
    fn test_priority_list_beats_recency() {
        let actives = [active(10, 50, 1, 0), active(20, 30, 2, 1)];
        let options = ExposeOptions::new().with_overlap(OverlapPolicy::Priority(vec![1, 2]));
        let pieces = resolve(WINDOW, &actives, &options);
        assert_eq!(
            codes(&pieces),
            vec![
                (1, 9, State::Code(0)),
                (10, 50, State::Code(1)),
                (51, 100, State::Code(0)),
            ]
        );
    }

    #[test]
    fn test_priority_by_rank_column() {
        let mut low = active(10, 50, 1, 0);
        low.rank = Some(2);
        let mut high = active(20, 60, 2, 1);
        high.rank = Some(1);
        let options = ExposeOptions::new().with_overlap(OverlapPolicy::Priority(vec![]));
        let pieces = resolve(WINDOW, &[low, high], &options);
        assert_eq!(pieces[2], (Span::new(20, 60), State::Code(2)));
    }

    #[test]
    fn test_split_reports_concurrent_codes() {
        let actives = [active(10, 30, 1, 0), active(20, 40, 2, 1)];
        let options = ExposeOptions::new().with_overlap(OverlapPolicy::Split);
        let pieces = resolve(WINDOW, &actives, &options);
        assert_eq!(pieces[2], (Span::new(20, 30), State::Codes(vec![1, 2])));
        assert_eq!(pieces[3], (Span::new(31, 40), State::Code(2)));
    }

    #[test]
    fn test_dose_rates_sum() {
        let mut a = active(1, 10, 1, 0);
        a.rate = 2.0;
        let mut b = active(6, 15, 1, 1);
        b.rate = 1.5;
        let options = ExposeOptions::new().with_overlap(OverlapPolicy::Dose);
        let pieces = resolve(Span::new(1, 20), &[a, b], &options);
        assert_eq!(
            codes(&pieces),
            vec![
                (1, 5, State::Rate(2.0)),
                (6, 10, State::Rate(3.5)),
                (11, 15, State::Rate(1.5)),
                (16, 20, State::Rate(0.0)),
            ]
        );
    }

    #[test]
    fn test_adjacent_same_code_collapses() {
        let actives = [active(10, 19, 1, 0), active(20, 30, 1, 1)];
        let pieces = resolve(WINDOW, &actives, &ExposeOptions::new());
        assert_eq!(pieces[1], (Span::new(10, 30), State::Code(1)));
    }
}
