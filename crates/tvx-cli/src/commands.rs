use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{info, info_span};

use tvx_core::{
    Coverage, EventResult, ExposeResult, MergeResult, attach_covariates, coverage, expose, merge,
    splice_events,
};
use tvx_ingest::{
    CohortColumns, EventColumns, FractionalDays, IngestError, IngestOptions, IntervalColumns,
    SegmentColumns, load_cohort, load_covariates, load_events, load_intervals, load_segments,
};
use tvx_model::{
    EventKind, EventOptions, ExposeOptions, ExposureDefinition, MergeOptions, OverlapPolicy,
    SegmentTable, TiePolicy, TimeColumn, TimeUnit, TvError, Window,
};
use tvx_output::{
    RateSummary, RateTable, SegmentModel, check_output, write_csv, write_csv_path,
};

use crate::cli::{
    CommonArgs, EventArgs, EventKindArg, ExposeArgs, FractionalArg, MergeArgs, TieArg, UnitArg,
};
use crate::config::RunConfig;

/// Outcome of `tvx expose`.
#[derive(Debug)]
pub struct ExposeRun {
    pub result: ExposeResult,
    pub coverage: Option<Vec<Coverage>>,
    /// Subjects without values for the `--keep` columns.
    pub without_covariates: usize,
    pub output: Option<PathBuf>,
}

/// Outcome of `tvx merge`.
#[derive(Debug)]
pub struct MergeRun {
    pub result: MergeResult,
    pub inputs: usize,
    pub output: Option<PathBuf>,
}

/// Outcome of `tvx event`.
#[derive(Debug)]
pub struct EventRun {
    pub result: EventResult,
    pub rates: Option<RateSummary>,
    /// Subjects without values for the `--keep` columns.
    pub without_covariates: usize,
    pub output: Option<PathBuf>,
}

/// Stable numeric code of the first engine or ingest error in the chain.
pub fn error_code(error: &anyhow::Error) -> Option<u16> {
    error.chain().find_map(|cause| {
        cause
            .downcast_ref::<TvError>()
            .map(TvError::code)
            .or_else(|| cause.downcast_ref::<IngestError>().map(IngestError::code))
    })
}

pub fn run_expose(args: &ExposeArgs) -> Result<ExposeRun> {
    let start = Instant::now();
    check_target(&args.common)?;
    let config = RunConfig::load(args.common.config.as_deref())?;
    let ingest = ingest_options(&args.common, config.ingest)?;
    let options = expose_options(args, config.expose)?;
    let span = info_span!("run_expose", cohort = %args.cohort.display());
    let _guard = span.enter();

    let cohort_columns = CohortColumns {
        id: args.id.clone(),
        entry: args.entry.clone(),
        exit: args.exit.clone(),
    };
    let cohort = load_cohort(&args.cohort, &cohort_columns, &ingest)
        .with_context(|| format!("load cohort {}", args.cohort.display()))?;
    let interval_columns = IntervalColumns {
        id: args.id.clone(),
        start: args.start.clone(),
        stop: (!args.pointtime).then(|| args.stop.clone()),
        value: args.exposure.clone(),
        rank: args.rank_column.clone(),
    };
    let intervals = load_intervals(&args.intervals, &interval_columns, &ingest)
        .with_context(|| format!("load intervals {}", args.intervals.display()))?;

    let mut result = expose(&cohort, &intervals, &options).context("split exposures")?;
    let coverage = args.check.then(|| coverage(&result.table, &cohort));
    let without_covariates = if args.keep.is_empty() {
        0
    } else {
        let covariates = load_covariates(&args.cohort, &args.id, &args.keep, &ingest)
            .with_context(|| format!("load covariates {}", args.cohort.display()))?;
        attach_covariates(&mut result.table, &covariates, false).context("keep cohort columns")?
    };
    write_table(&result.table, &args.common)?;
    info!(
        segments = result.table.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "expose complete"
    );
    Ok(ExposeRun {
        result,
        coverage,
        without_covariates,
        output: args.common.output.clone(),
    })
}

pub fn run_merge(args: &MergeArgs) -> Result<MergeRun> {
    let start = Instant::now();
    check_target(&args.common)?;
    let config = RunConfig::load(args.common.config.as_deref())?;
    let ingest = ingest_options(&args.common, config.ingest)?;
    let options = merge_options(args, config.merge)?;
    let span = info_span!("run_merge", tables = args.tables.len());
    let _guard = span.enter();

    let columns = SegmentColumns {
        amounts: args.amounts.clone(),
        levels: args.levels.clone(),
        reference: args.reference,
        ..SegmentColumns::default()
    };
    let tables = args
        .tables
        .iter()
        .map(|path| load_table(path, &columns, &ingest))
        .collect::<Result<Vec<_>>>()?;
    require_named(&tables, &columns)?;

    let result = merge(&tables, &options).context("merge tables")?;
    write_table(&result.table, &args.common)?;
    info!(
        rows = result.table.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "merge complete"
    );
    Ok(MergeRun {
        result,
        inputs: tables.len(),
        output: args.common.output.clone(),
    })
}

pub fn run_event(args: &EventArgs) -> Result<EventRun> {
    let start = Instant::now();
    check_target(&args.common)?;
    let config = RunConfig::load(args.common.config.as_deref())?;
    let ingest = ingest_options(&args.common, config.ingest)?;
    let options = event_options(args, config.event)?;
    let span = info_span!("run_event", events = %args.events.display());
    let _guard = span.enter();

    let columns = SegmentColumns {
        id: args.id.clone(),
        amounts: args.amounts.clone(),
        levels: args.levels.clone(),
        ..SegmentColumns::default()
    };
    let table = load_table(&args.segments, &columns, &ingest)?;
    require_named(std::slice::from_ref(&table), &columns)?;
    let event_columns = EventColumns {
        id: args.id.clone(),
        dates: vec![args.date.clone()],
        wide_prefix: args.wide_prefix.clone(),
        competing: args.compete.clone(),
    };
    let events = load_events(&args.events, &event_columns, &ingest)
        .with_context(|| format!("load events {}", args.events.display()))?;

    let mut result = splice_events(&table, &events, &options).context("splice events")?;
    let without_covariates = if args.keep.is_empty() {
        0
    } else {
        let covariates = load_covariates(&args.events, &args.id, &args.keep, &ingest)
            .with_context(|| format!("load covariates {}", args.events.display()))?;
        attach_covariates(&mut result.table, &covariates, options.replace)
            .context("keep event columns")?
    };
    let rates = match &args.rates {
        Some(by) => {
            let model = RateTable::new(by.clone(), options.generate.clone());
            Some(model.fit(&result.table).context("fit rate table")?)
        }
        None => None,
    };
    write_table(&result.table, &args.common)?;
    info!(
        rows = result.table.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "event complete"
    );
    Ok(EventRun {
        result,
        rates,
        without_covariates,
        output: args.common.output.clone(),
    })
}

fn load_table(
    path: &Path,
    columns: &SegmentColumns,
    ingest: &IngestOptions,
) -> Result<SegmentTable> {
    load_segments(path, columns, ingest)
        .with_context(|| format!("load segments {}", path.display()))
}

/// Every `--amounts`/`--levels` name must occur in at least one table.
fn require_named(tables: &[SegmentTable], columns: &SegmentColumns) -> Result<()> {
    for name in columns.amounts.iter().chain(&columns.levels) {
        let found = tables
            .iter()
            .any(|table| table.column_names().any(|c| c.eq_ignore_ascii_case(name)));
        if !found {
            return Err(TvError::MissingColumn {
                column: name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Fail before any input is read when the output file already exists.
fn check_target(common: &CommonArgs) -> Result<()> {
    match &common.output {
        Some(path) => check_output(path, common.replace),
        None => Ok(()),
    }
}

fn write_table(table: &SegmentTable, common: &CommonArgs) -> Result<()> {
    match &common.output {
        Some(path) => write_csv_path(table, path, common.replace),
        None => write_csv(table, io::stdout().lock()).context("write segment table to stdout"),
    }
}

// =========================================================================
// Options: config file first, flags on top
// =========================================================================

fn ingest_options(common: &CommonArgs, base: IngestOptions) -> Result<IngestOptions> {
    let mut options = base;
    if let Some(delimiter) = common.delimiter {
        options = options.with_delimiter(delimiter);
    }
    if let Some(fractional) = common.fractional {
        options = options.with_fractional(fractional.into());
    }
    options.validate()?;
    Ok(options)
}

pub fn expose_options(args: &ExposeArgs, base: ExposeOptions) -> Result<ExposeOptions> {
    let mut options = base;
    if let Some(reference) = args.reference {
        options.reference = reference;
    }

    if let Some(ranks) = &args.priority {
        options.overlap = OverlapPolicy::Priority(ranks.clone());
    } else if args.rank_column.is_some() {
        options.overlap = OverlapPolicy::Priority(Vec::new());
    } else if args.layer {
        options.overlap = OverlapPolicy::Layer;
    } else if args.split {
        options.overlap = OverlapPolicy::Split;
    } else if args.dose {
        options.overlap = OverlapPolicy::Dose;
    }

    if let Some(lag) = args.lag {
        options.lag = lag;
    }
    if let Some(washout) = args.washout {
        options.washout = washout;
    }
    if let Some(window) = &args.window {
        let [min, max] = window.as_slice() else {
            return Err(TvError::InvalidConfig("window takes exactly MIN,MAX".to_string()).into());
        };
        options.window = Some(Window {
            min: *min,
            max: *max,
        });
    }
    if let Some(grace) = args.grace {
        options.grace.default = grace;
    }
    for &(code, days) in &args.grace_code {
        options.grace.by_code.insert(code, days);
    }
    if let Some(merge) = args.merge {
        options.merge = merge;
    }

    let unit = args.continuousunit.map(TimeUnit::from);
    if args.evertreated {
        options.definition = ExposureDefinition::EverTreated;
    } else if args.currentformer {
        options.definition = ExposureDefinition::CurrentFormer;
    } else if let Some(thresholds) = &args.duration {
        options.definition = ExposureDefinition::Duration {
            thresholds: thresholds.clone(),
            unit: unit.unwrap_or_default(),
        };
    } else if let Some(thresholds) = &args.recency {
        options.definition = ExposureDefinition::Recency {
            thresholds: thresholds.clone(),
        };
    } else if let Some(cuts) = &args.dosecuts {
        options.definition = ExposureDefinition::CumulativeDose { cuts: cuts.clone() };
    } else if args.cumulative_dose {
        options.definition = ExposureDefinition::CumulativeDose { cuts: Vec::new() };
    } else if let Some(unit) = unit {
        options.definition = ExposureDefinition::Continuous { unit };
    }

    options.bytype |= args.bytype;
    if let Some(name) = &args.generate {
        options.generate = name.clone();
    }
    options.patterns.switching |= args.switching;
    options.patterns.switching_detail |= args.switching_detail;
    options.patterns.statetime |= args.statetime;
    options.keep_dates |= args.keepdates;

    options.validate()?;
    Ok(options)
}

pub fn merge_options(args: &MergeArgs, base: MergeOptions) -> Result<MergeOptions> {
    let mut options = base;
    if !args.generate.is_empty() {
        options.generate = args.generate.clone();
    }
    if let Some(prefix) = &args.prefix {
        options.prefix = Some(prefix.clone());
    }
    options.strict_ids |= args.strict_ids;
    options.validate()?;
    Ok(options)
}

pub fn event_options(args: &EventArgs, base: EventOptions) -> Result<EventOptions> {
    let mut options = base;
    if let Some(kind) = args.kind {
        options.kind = kind.into();
    }
    if let Some(tie) = args.tie {
        options.tie = tie.into();
    }
    if let Some(name) = &args.generate {
        options.generate = name.clone();
    }
    options.replace |= args.replace_columns;
    if let Some(name) = &args.timegen {
        options.timegen = Some(TimeColumn {
            name: name.clone(),
            unit: args.timeunit.into(),
        });
    }
    options.validate()?;
    Ok(options)
}

impl From<FractionalArg> for FractionalDays {
    fn from(value: FractionalArg) -> Self {
        match value {
            FractionalArg::Floor => Self::Floor,
            FractionalArg::Round => Self::Round,
            FractionalArg::Reject => Self::Reject,
        }
    }
}

impl From<UnitArg> for TimeUnit {
    fn from(value: UnitArg) -> Self {
        match value {
            UnitArg::Days => Self::Days,
            UnitArg::Weeks => Self::Weeks,
            UnitArg::Months => Self::Months,
            UnitArg::Quarters => Self::Quarters,
            UnitArg::Years => Self::Years,
        }
    }
}

impl From<EventKindArg> for EventKind {
    fn from(value: EventKindArg) -> Self {
        match value {
            EventKindArg::Single => Self::Single,
            EventKindArg::Recurring => Self::Recurring,
        }
    }
}

impl From<TieArg> for TiePolicy {
    fn from(value: TieArg) -> Self {
        match value {
            TieArg::CompetingWins => Self::CompetingWins,
            TieArg::PrimaryWins => Self::PrimaryWins,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn expose_args(extra: &[&str]) -> ExposeArgs {
        let mut argv = vec!["tvx", "expose", "--cohort", "c.csv", "--intervals", "i.csv"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Expose(args) => args,
            _ => panic!("expected expose"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let base = ExposeOptions::new()
            .with_overlap(OverlapPolicy::Split)
            .with_lag(5);
        let args = expose_args(&["--priority", "2,1", "--grace", "30", "--grace-code", "2=14"]);
        let options = expose_options(&args, base).unwrap();
        assert_eq!(options.overlap, OverlapPolicy::Priority(vec![2, 1]));
        assert_eq!(options.lag, 5);
        assert_eq!(options.grace.days_for(2), 14);
        assert_eq!(options.grace.days_for(1), 30);
    }

    #[test]
    fn test_duration_with_unit() {
        let args = expose_args(&["--duration", "0.5,1", "--continuousunit", "years"]);
        let options = expose_options(&args, ExposeOptions::new()).unwrap();
        assert_eq!(
            options.definition,
            ExposureDefinition::Duration {
                thresholds: vec![0.5, 1.0],
                unit: TimeUnit::Years,
            }
        );
    }

    #[test]
    fn test_bad_window_is_config_error() {
        let args = expose_args(&["--window", "1,2,3"]);
        let err = expose_options(&args, ExposeOptions::new()).unwrap_err();
        assert_eq!(error_code(&err), Some(198));
    }

    #[test]
    fn test_invalid_combination_fails_before_reading() {
        let args = expose_args(&["--dose", "--washout", "10"]);
        let err = expose_options(&args, ExposeOptions::new()).unwrap_err();
        assert_eq!(error_code(&err), Some(198));
    }
}
