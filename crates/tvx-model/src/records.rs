//! Input records: cohort windows, exposure intervals and event dates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TvError};
use crate::ids::SubjectId;

/// A subject and its observation window `[entry, exit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub entry: NaiveDate,
    pub exit: NaiveDate,
}

impl Subject {
    /// Create a subject, rejecting windows where `exit < entry`.
    pub fn new(id: impl Into<SubjectId>, entry: NaiveDate, exit: NaiveDate) -> Result<Self> {
        let subject = Self {
            id: id.into(),
            entry,
            exit,
        };
        subject.validate()?;
        Ok(subject)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exit < self.entry {
            return Err(TvError::InvalidWindow {
                id: self.id,
                entry: self.entry,
                exit: self.exit,
            });
        }
        Ok(())
    }

    /// Length of follow-up in days, both ends inclusive.
    pub fn days(&self) -> i64 {
        (self.exit - self.entry).num_days() + 1
    }
}

/// One exposure record as read from the interval file.
///
/// `value` is either a categorical exposure code (integral) or a dose amount
/// delivered over the whole interval, depending on the overlap policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInterval {
    pub id: SubjectId,
    pub start: NaiveDate,
    pub stop: NaiveDate,
    pub value: f64,
    /// Optional priority rank (lower wins) used by priority resolution when
    /// no explicit rank list is configured.
    pub rank: Option<u32>,
}

impl RawInterval {
    pub fn new(id: impl Into<SubjectId>, start: NaiveDate, stop: NaiveDate, value: f64) -> Self {
        Self {
            id: id.into(),
            start,
            stop,
            value,
            rank: None,
        }
    }

    #[must_use]
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    /// A single-day record for point-in-time data.
    pub fn point(id: impl Into<SubjectId>, date: NaiveDate, value: f64) -> Self {
        Self::new(id, date, date, value)
    }
}

/// Event dates for one subject.
///
/// `dates` holds the primary outcome dates: one date for single events, any
/// number for recurring (wide `date1..dateN`) events. `competing` holds the
/// competing-risk dates in column order; position `i` is flagged with code
/// `i + 2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: SubjectId,
    pub dates: Vec<NaiveDate>,
    pub competing: Vec<Option<NaiveDate>>,
}

impl EventRecord {
    pub fn new(id: impl Into<SubjectId>, date: Option<NaiveDate>) -> Self {
        Self {
            id: id.into(),
            dates: date.into_iter().collect(),
            competing: Vec::new(),
        }
    }

    pub fn recurring(id: impl Into<SubjectId>, dates: Vec<NaiveDate>) -> Self {
        Self {
            id: id.into(),
            dates,
            competing: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_competing(mut self, date: Option<NaiveDate>) -> Self {
        self.competing.push(date);
        self
    }

    pub fn has_competing(&self) -> bool {
        self.competing.iter().any(Option::is_some)
    }
}
