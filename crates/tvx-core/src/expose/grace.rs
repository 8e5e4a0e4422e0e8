//! Grace-period bridging of resolved segments.

use tvx_model::ExposeOptions;

use crate::day::{Span, collapse};
use crate::expose::resolve::State;

/// Reassign a reference run lying between two segments of the same code `c`
/// to `c` when the run is at most `grace.days_for(c)` days long.
pub(crate) fn bridge(pieces: Vec<(Span, State)>, options: &ExposeOptions) -> Vec<(Span, State)> {
    if options.grace.is_zero() || pieces.len() < 3 {
        return pieces;
    }
    let reference = State::Code(options.reference);
    let mut pieces = pieces;
    for idx in 1..pieces.len() - 1 {
        if pieces[idx].1 != reference {
            continue;
        }
        let State::Code(before) = pieces[idx - 1].1 else {
            continue;
        };
        if before == options.reference || pieces[idx + 1].1 != State::Code(before) {
            continue;
        }
        // Neighbors must touch the run; a gap outside the window never bridges.
        if pieces[idx - 1].0.stop + 1 != pieces[idx].0.start
            || pieces[idx].0.stop + 1 != pieces[idx + 1].0.start
        {
            continue;
        }
        if pieces[idx].0.len() <= i64::from(options.grace.days_for(before)) {
            pieces[idx].1 = State::Code(before);
        }
    }
    collapse(pieces)
}
