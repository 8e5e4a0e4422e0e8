//! Day-number arithmetic.
//!
//! The engine works on signed day numbers (days since 0001-01-01, as chrono
//! counts them) and inclusive spans; dates only appear at the edges.

use chrono::{Datelike, NaiveDate};
use tvx_model::{Result, TvError};

pub type Day = i64;

pub fn day_number(date: NaiveDate) -> Day {
    Day::from(date.num_days_from_ce())
}

pub fn to_date(day: Day) -> Result<NaiveDate> {
    i32::try_from(day)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| TvError::InvalidValue {
            field: "day number".to_string(),
            value: day.to_string(),
        })
}

/// Inclusive day span `[start, stop]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: Day,
    pub stop: Day,
}

impl Span {
    pub const fn new(start: Day, stop: Day) -> Self {
        Self { start, stop }
    }

    pub fn from_dates(start: NaiveDate, stop: NaiveDate) -> Self {
        Self::new(day_number(start), day_number(stop))
    }

    pub fn len(self) -> i64 {
        self.stop - self.start + 1
    }

    pub fn is_empty(self) -> bool {
        self.stop < self.start
    }

    pub fn contains(self, day: Day) -> bool {
        self.start <= day && day <= self.stop
    }

    pub fn intersect(self, other: Self) -> Option<Self> {
        let span = Self::new(self.start.max(other.start), self.stop.min(other.stop));
        (!span.is_empty()).then_some(span)
    }

    /// Cut the span so that each day in `cuts` starts a new piece. Cuts
    /// outside `(start, stop]` are ignored.
    pub fn split_at(self, cuts: impl IntoIterator<Item = Day>) -> Vec<Self> {
        let mut points: Vec<Day> = cuts
            .into_iter()
            .filter(|day| *day > self.start && *day <= self.stop)
            .collect();
        points.sort_unstable();
        points.dedup();
        let mut pieces = Vec::with_capacity(points.len() + 1);
        let mut start = self.start;
        for point in points {
            pieces.push(Self::new(start, point - 1));
            start = point;
        }
        pieces.push(Self::new(start, self.stop));
        pieces
    }
}

/// Merge adjacent pieces that carry equal values.
pub fn collapse<T: PartialEq>(pieces: Vec<(Span, T)>) -> Vec<(Span, T)> {
    let mut out: Vec<(Span, T)> = Vec::with_capacity(pieces.len());
    for (span, value) in pieces {
        if let Some((last, last_value)) = out.last_mut()
            && last.stop + 1 == span.start
            && *last_value == value
        {
            last.stop = span.stop;
            continue;
        }
        out.push((span, value));
    }
    out
}
