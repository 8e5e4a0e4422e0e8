//! Configuration options for exposure splitting, merging and event splicing.
//!
//! Every options struct validates itself before any row is processed so that
//! configuration mistakes fail fast with [`TvError::InvalidConfig`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TvError};
use crate::table::RESERVED_COLUMNS;

/// Calendar unit used to express cumulative-time thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Days,
    Weeks,
    Months,
    Quarters,
    Years,
}

impl TimeUnit {
    /// Average length of one unit in days.
    pub fn days(self) -> f64 {
        match self {
            Self::Days => 1.0,
            Self::Weeks => 7.0,
            Self::Months => 365.25 / 12.0,
            Self::Quarters => 365.25 / 4.0,
            Self::Years => 365.25,
        }
    }

    /// Threshold expressed in whole days, rounded up.
    ///
    /// One year is `ceil(365.25) = 366` days: a 365-day exposure stays below
    /// a one-year cut, a 366-day exposure reaches it.
    pub fn threshold_days(self, threshold: f64) -> i64 {
        (threshold * self.days()).ceil() as i64
    }

    /// Convert a day count into this unit.
    pub fn from_days(self, days: i64) -> f64 {
        days as f64 / self.days()
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Quarters => "quarters",
            Self::Years => "years",
        };
        f.write_str(name)
    }
}

impl FromStr for TimeUnit {
    type Err = TvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "day" | "days" => Ok(Self::Days),
            "w" | "week" | "weeks" => Ok(Self::Weeks),
            "m" | "month" | "months" => Ok(Self::Months),
            "q" | "quarter" | "quarters" => Ok(Self::Quarters),
            "y" | "year" | "years" => Ok(Self::Years),
            other => Err(TvError::config(format!("unknown time unit '{other}'"))),
        }
    }
}

/// How overlapping intervals of one subject are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// The most recently started interval wins.
    #[default]
    Layer,
    /// Highest-ranked code wins. An empty list ranks by each interval's own
    /// rank column (lower wins).
    Priority(Vec<i64>),
    /// No precedence: the state is the set of concurrently active codes.
    Split,
    /// Values are doses; overlapping daily rates are summed.
    Dose,
}

/// What the generated exposure column measures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureDefinition {
    /// The resolved exposure state itself.
    #[default]
    TimeVarying,
    /// 0 before the first exposed day, 1 from then on.
    EverTreated,
    /// 0 never, 1 current, 2 former.
    CurrentFormer,
    /// Cumulative exposed time categorized by thresholds in `unit`.
    Duration { thresholds: Vec<f64>, unit: TimeUnit },
    /// Cumulative exposed time in `unit` at each segment stop.
    Continuous { unit: TimeUnit },
    /// Time since last exposure, thresholds in years.
    Recency { thresholds: Vec<f64> },
    /// Cumulative dose, categorized when `cuts` is non-empty.
    CumulativeDose { cuts: Vec<f64> },
}

impl ExposureDefinition {
    /// Default output stub used for per-type columns.
    pub fn stub(&self) -> &'static str {
        match self {
            Self::TimeVarying => "tv_exposure",
            Self::EverTreated => "ever",
            Self::CurrentFormer => "cf",
            Self::Duration { .. } => "duration",
            Self::Continuous { .. } => "tv_exp",
            Self::Recency { .. } => "recency",
            Self::CumulativeDose { .. } => "cumul_dose",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Duration { thresholds, .. } => validate_thresholds("duration", thresholds),
            Self::Recency { thresholds } => validate_thresholds("recency", thresholds),
            Self::CumulativeDose { cuts } if !cuts.is_empty() => {
                validate_thresholds("dosecuts", cuts)
            }
            _ => Ok(()),
        }
    }
}

/// Acute exposure window relative to each interval's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub min: u32,
    pub max: u32,
}

/// Gap tolerance between same-code segments, optionally per code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraceSpec {
    pub default: u32,
    #[serde(default)]
    pub by_code: BTreeMap<i64, u32>,
}

impl GraceSpec {
    pub fn uniform(days: u32) -> Self {
        Self {
            default: days,
            by_code: BTreeMap::new(),
        }
    }

    pub fn days_for(&self, code: i64) -> u32 {
        self.by_code.get(&code).copied().unwrap_or(self.default)
    }

    pub fn is_zero(&self) -> bool {
        self.default == 0 && self.by_code.values().all(|days| *days == 0)
    }
}

/// Extra per-subject pattern columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatternOptions {
    pub switching: bool,
    pub switching_detail: bool,
    pub statetime: bool,
}

impl PatternOptions {
    pub fn any(&self) -> bool {
        self.switching || self.switching_detail || self.statetime
    }
}

pub const DEFAULT_EXPOSURE_NAME: &str = "tv_exposure";
/// Columns added by `keep_dates`.
pub const ENTRY_COLUMN: &str = "study_entry";
pub const EXIT_COLUMN: &str = "study_exit";

/// Options for the exposure splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposeOptions {
    /// Unexposed code.
    pub reference: i64,
    pub overlap: OverlapPolicy,
    pub definition: ExposureDefinition,
    /// Days from interval start before exposure counts.
    pub lag: u32,
    /// Days exposure persists past interval stop.
    pub washout: u32,
    pub window: Option<Window>,
    /// Bridging applied to resolved segments.
    pub grace: GraceSpec,
    /// Bridging applied to raw same-code intervals before resolution.
    pub merge: u32,
    /// Track each exposure code in its own column.
    pub bytype: bool,
    /// Output column name, or stub name under `bytype`.
    pub generate: String,
    pub patterns: PatternOptions,
    /// Append each subject's entry and exit dates to every segment.
    pub keep_dates: bool,
}

impl Default for ExposeOptions {
    fn default() -> Self {
        Self {
            reference: 0,
            overlap: OverlapPolicy::default(),
            definition: ExposureDefinition::default(),
            lag: 0,
            washout: 0,
            window: None,
            grace: GraceSpec::default(),
            merge: 0,
            bytype: false,
            generate: DEFAULT_EXPOSURE_NAME.to_string(),
            patterns: PatternOptions::default(),
            keep_dates: false,
        }
    }
}

impl ExposeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reference(mut self, reference: i64) -> Self {
        self.reference = reference;
        self
    }

    #[must_use]
    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    #[must_use]
    pub fn with_definition(mut self, definition: ExposureDefinition) -> Self {
        self.definition = definition;
        self
    }

    #[must_use]
    pub fn with_lag(mut self, days: u32) -> Self {
        self.lag = days;
        self
    }

    #[must_use]
    pub fn with_washout(mut self, days: u32) -> Self {
        self.washout = days;
        self
    }

    #[must_use]
    pub fn with_window(mut self, min: u32, max: u32) -> Self {
        self.window = Some(Window { min, max });
        self
    }

    #[must_use]
    pub fn with_grace(mut self, grace: GraceSpec) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn with_merge(mut self, days: u32) -> Self {
        self.merge = days;
        self
    }

    #[must_use]
    pub fn with_bytype(mut self, enable: bool) -> Self {
        self.bytype = enable;
        self
    }

    #[must_use]
    pub fn with_generate(mut self, name: impl Into<String>) -> Self {
        self.generate = name.into();
        self
    }

    #[must_use]
    pub fn with_patterns(mut self, patterns: PatternOptions) -> Self {
        self.patterns = patterns;
        self
    }

    #[must_use]
    pub fn with_keep_dates(mut self, enable: bool) -> Self {
        self.keep_dates = enable;
        self
    }

    pub fn is_dose(&self) -> bool {
        matches!(self.overlap, OverlapPolicy::Dose)
    }

    /// Stub used to build per-type column names.
    pub fn stub(&self) -> &str {
        if self.bytype && self.generate == DEFAULT_EXPOSURE_NAME {
            self.definition.stub()
        } else {
            &self.generate
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.generate)?;
        self.definition.validate()?;
        if let Some(window) = self.window
            && window.min > window.max
        {
            return Err(TvError::config(format!(
                "window minimum {} exceeds maximum {}",
                window.min, window.max
            )));
        }
        if let OverlapPolicy::Priority(order) = &self.overlap {
            let mut seen = order.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != order.len() {
                return Err(TvError::config("priority list contains duplicates"));
            }
        }
        if self.is_dose() {
            if self.washout > 0 || self.merge > 0 || !self.grace.is_zero() {
                return Err(TvError::config(
                    "washout, merge and grace cannot be combined with dose",
                ));
            }
            if self.bytype {
                return Err(TvError::config("bytype cannot be combined with dose"));
            }
            if !matches!(
                self.definition,
                ExposureDefinition::TimeVarying | ExposureDefinition::CumulativeDose { .. }
            ) {
                return Err(TvError::config(
                    "dose supports only the time-varying or cumulative dose definition",
                ));
            }
        } else if matches!(self.definition, ExposureDefinition::CumulativeDose { .. }) {
            return Err(TvError::config("cumulative dose requires the dose policy"));
        }
        if self.bytype && self.patterns.any() {
            return Err(TvError::config(
                "switching and statetime columns require a single exposure column",
            ));
        }
        Ok(())
    }
}

/// Options for combining split tables.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// New names for the combined value columns, one per column.
    pub generate: Vec<String>,
    /// Prefix added to every value column.
    pub prefix: Option<String>,
    /// Fail when a subject is missing from any table instead of filling it
    /// with reference values.
    pub strict_ids: bool,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_generate(mut self, names: Vec<String>) -> Self {
        self.generate = names;
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_strict_ids(mut self, enable: bool) -> Self {
        self.strict_ids = enable;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.generate.is_empty() && self.prefix.is_some() {
            return Err(TvError::config("generate and prefix are mutually exclusive"));
        }
        for name in &self.generate {
            validate_name(name)?;
        }
        Ok(())
    }
}

/// Whether an event ends follow-up or can repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Single,
    Recurring,
}

/// Outcome when the primary and a competing date fall on the same day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    #[default]
    CompetingWins,
    PrimaryWins,
}

/// Optional segment-length column written by the event splicer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeColumn {
    pub name: String,
    pub unit: TimeUnit,
}

pub const DEFAULT_FAILURE_NAME: &str = "_failure";

/// Options for event splicing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventOptions {
    pub kind: EventKind,
    /// Name of the event flag column.
    pub generate: String,
    /// Overwrite existing columns of the same name.
    pub replace: bool,
    pub tie: TiePolicy,
    pub timegen: Option<TimeColumn>,
}

impl Default for EventOptions {
    fn default() -> Self {
        Self {
            kind: EventKind::Single,
            generate: DEFAULT_FAILURE_NAME.to_string(),
            replace: false,
            tie: TiePolicy::default(),
            timegen: None,
        }
    }
}

impl EventOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_generate(mut self, name: impl Into<String>) -> Self {
        self.generate = name.into();
        self
    }

    #[must_use]
    pub fn with_replace(mut self, enable: bool) -> Self {
        self.replace = enable;
        self
    }

    #[must_use]
    pub fn with_tie(mut self, tie: TiePolicy) -> Self {
        self.tie = tie;
        self
    }

    #[must_use]
    pub fn with_timegen(mut self, name: impl Into<String>, unit: TimeUnit) -> Self {
        self.timegen = Some(TimeColumn {
            name: name.into(),
            unit,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.generate)?;
        if let Some(time) = &self.timegen {
            validate_name(&time.name)?;
            if time.name == self.generate {
                return Err(TvError::OutputExists {
                    name: time.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TvError::config("output name must not be empty"));
    }
    if RESERVED_COLUMNS.contains(&name) {
        return Err(TvError::OutputExists {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate_thresholds(option: &str, thresholds: &[f64]) -> Result<()> {
    if thresholds.is_empty() {
        return Err(TvError::config(format!("{option} requires at least one threshold")));
    }
    if let Some(bad) = thresholds.iter().find(|t| !t.is_finite() || **t <= 0.0) {
        return Err(TvError::config(format!(
            "{option} thresholds must be positive, got {bad}"
        )));
    }
    if thresholds.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(TvError::config(format!(
            "{option} thresholds must be strictly increasing"
        )));
    }
    Ok(())
}
