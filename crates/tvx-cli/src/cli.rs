//! CLI argument definitions for `tvx`.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "tvx",
    version,
    about = "Time-varying exposure intervals for survival analysis",
    long_about = "Split follow-up into exposure-labeled segments, merge split tables, \
                  and splice event dates into them.\n\n\
                  Tables are read from and written to CSV. The segment table goes to \
                  stdout unless --output is given; summaries and logs go to stderr."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Split cohort follow-up into exposure segments.
    Expose(ExposeArgs),

    /// Combine two or more split tables on a common partition.
    Merge(MergeArgs),

    /// Splice event dates into a split table.
    Event(EventArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Clone, Default)]
pub struct CommonArgs {
    /// JSON options file; flags given on the command line take precedence.
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the segment table here instead of stdout.
    #[arg(long = "output", short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing output file.
    #[arg(long = "replace")]
    pub replace: bool,

    /// Field delimiter of the input files.
    #[arg(long = "delimiter", value_name = "CHAR")]
    pub delimiter: Option<char>,

    /// Treatment of fractional day numbers in date cells.
    #[arg(long = "fractional", value_enum)]
    pub fractional: Option<FractionalArg>,

    /// Skip the summary table.
    #[arg(long = "quiet-summary")]
    pub quiet_summary: bool,
}

#[derive(Parser)]
#[command(group(
    ArgGroup::new("overlap").args(["priority", "rank_column", "layer", "split", "dose"])
))]
#[command(group(
    ArgGroup::new("definition").args([
        "evertreated",
        "currentformer",
        "duration",
        "recency",
        "dosecuts",
        "cumulative_dose",
    ])
))]
pub struct ExposeArgs {
    /// Cohort file with one row per subject.
    #[arg(long = "cohort", value_name = "PATH")]
    pub cohort: PathBuf,

    /// Exposure interval file.
    #[arg(long = "intervals", value_name = "PATH")]
    pub intervals: PathBuf,

    #[arg(long = "id", value_name = "COL", default_value = "id")]
    pub id: String,

    #[arg(long = "entry", value_name = "COL", default_value = "entry")]
    pub entry: String,

    #[arg(long = "exit", value_name = "COL", default_value = "exit")]
    pub exit: String,

    #[arg(long = "start", value_name = "COL", default_value = "start")]
    pub start: String,

    #[arg(long = "stop", value_name = "COL", default_value = "stop")]
    pub stop: String,

    /// Column holding the exposure code (or dose amount with --dose).
    #[arg(long = "exposure", value_name = "COL", default_value = "value")]
    pub exposure: String,

    /// Intervals have a start date only and cover a single day.
    #[arg(long = "pointtime")]
    pub pointtime: bool,

    /// Unexposed code.
    #[arg(long = "reference", value_name = "CODE")]
    pub reference: Option<i64>,

    // === Overlap ===
    /// Rank order of codes; the earliest listed code wins overlaps.
    #[arg(long = "priority", value_name = "CODES", value_delimiter = ',')]
    pub priority: Option<Vec<i64>>,

    /// Resolve overlaps by a per-interval rank column (lower wins).
    #[arg(long = "rank-column", value_name = "COL")]
    pub rank_column: Option<String>,

    /// The most recently started interval wins overlaps.
    #[arg(long = "layer")]
    pub layer: bool,

    /// Keep all concurrently active codes.
    #[arg(long = "split")]
    pub split: bool,

    /// Treat values as doses and sum overlapping daily rates.
    #[arg(long = "dose")]
    pub dose: bool,

    // === Activation ===
    /// Days after interval start before exposure counts.
    #[arg(long = "lag", value_name = "DAYS")]
    pub lag: Option<u32>,

    /// Days exposure persists after interval stop.
    #[arg(long = "washout", value_name = "DAYS")]
    pub washout: Option<u32>,

    /// Acute window MIN,MAX in days from interval start.
    #[arg(long = "window", value_name = "MIN,MAX", value_delimiter = ',')]
    pub window: Option<Vec<u32>>,

    /// Bridge gaps of up to DAYS between same-code segments.
    #[arg(long = "grace", value_name = "DAYS")]
    pub grace: Option<u32>,

    /// Per-code grace period, CODE=DAYS (repeatable).
    #[arg(long = "grace-code", value_name = "CODE=DAYS", value_parser = parse_code_days)]
    pub grace_code: Vec<(i64, u32)>,

    /// Merge same-code intervals separated by up to DAYS before resolving.
    #[arg(long = "merge", value_name = "DAYS")]
    pub merge: Option<u32>,

    // === Definition ===
    /// 0 before first exposure, 1 afterwards.
    #[arg(long = "evertreated")]
    pub evertreated: bool,

    /// 0 never, 1 current, 2 former.
    #[arg(long = "currentformer")]
    pub currentformer: bool,

    /// Cumulative exposure categories at these thresholds.
    #[arg(long = "duration", value_name = "CUTS", value_delimiter = ',')]
    pub duration: Option<Vec<f64>>,

    /// Unit of --duration thresholds, or cumulative time output on its own.
    #[arg(long = "continuousunit", value_name = "UNIT", value_enum)]
    pub continuousunit: Option<UnitArg>,

    /// Time-since-last-exposure categories, thresholds in years.
    #[arg(long = "recency", value_name = "YEARS", value_delimiter = ',')]
    pub recency: Option<Vec<f64>>,

    /// Cumulative dose categories at these cut points.
    #[arg(long = "dosecuts", value_name = "CUTS", value_delimiter = ',')]
    pub dosecuts: Option<Vec<f64>>,

    /// Cumulative dose as a continuous column.
    #[arg(long = "cumulative-dose")]
    pub cumulative_dose: bool,

    /// Track each exposure code in its own column.
    #[arg(long = "bytype")]
    pub bytype: bool,

    /// Output column name (stub name with --bytype).
    #[arg(long = "generate", value_name = "NAME")]
    pub generate: Option<String>,

    // === Patterns ===
    #[arg(long = "switching")]
    pub switching: bool,

    #[arg(long = "switchingdetail")]
    pub switching_detail: bool,

    #[arg(long = "statetime")]
    pub statetime: bool,

    // === Carried columns ===
    /// Cohort columns copied onto every segment of a subject.
    #[arg(long = "keep", value_name = "COLS", value_delimiter = ',')]
    pub keep: Vec<String>,

    /// Add study entry and exit dates to every segment.
    #[arg(long = "keepdates")]
    pub keepdates: bool,

    /// Report per-subject coverage of the follow-up window.
    #[arg(long = "check")]
    pub check: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser)]
pub struct MergeArgs {
    /// Split tables to combine.
    #[arg(value_name = "TABLES", num_args = 2..)]
    pub tables: Vec<PathBuf>,

    /// Dose-like columns, rescaled when segments are cut.
    #[arg(long = "amounts", value_name = "COLS", value_delimiter = ',')]
    pub amounts: Vec<String>,

    /// Continuous columns carried unchanged.
    #[arg(long = "levels", value_name = "COLS", value_delimiter = ',')]
    pub levels: Vec<String>,

    /// Reference code of categorical columns.
    #[arg(long = "reference", value_name = "CODE", default_value_t = 0)]
    pub reference: i64,

    /// New names for the combined value columns.
    #[arg(long = "generate", value_name = "NAMES", value_delimiter = ',')]
    pub generate: Vec<String>,

    /// Prefix for every combined value column.
    #[arg(long = "prefix", value_name = "PREFIX", conflicts_with = "generate")]
    pub prefix: Option<String>,

    /// Fail when a subject is missing from any table.
    #[arg(long = "strict-ids")]
    pub strict_ids: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser)]
pub struct EventArgs {
    /// Split table to splice events into.
    #[arg(long = "segments", value_name = "PATH")]
    pub segments: PathBuf,

    /// Event file.
    #[arg(long = "events", value_name = "PATH")]
    pub events: PathBuf,

    #[arg(long = "id", value_name = "COL", default_value = "id")]
    pub id: String,

    /// Primary event date column.
    #[arg(long = "date", value_name = "COL", default_value = "date")]
    pub date: String,

    /// Wide-format recurring dates `<PREFIX>1..<PREFIX>N`.
    #[arg(long = "wide-prefix", value_name = "PREFIX", conflicts_with = "date")]
    pub wide_prefix: Option<String>,

    /// Competing-risk date columns, flagged 2, 3, ... in order.
    #[arg(long = "compete", value_name = "COL", value_delimiter = ',')]
    pub compete: Vec<String>,

    #[arg(long = "type", value_enum)]
    pub kind: Option<EventKindArg>,

    /// Outcome when primary and competing dates coincide.
    #[arg(long = "tie", value_enum)]
    pub tie: Option<TieArg>,

    /// Name of the event flag column.
    #[arg(long = "generate", value_name = "NAME")]
    pub generate: Option<String>,

    /// Overwrite existing flag and time columns.
    #[arg(long = "replace-columns")]
    pub replace_columns: bool,

    /// Add a segment length column with this name.
    #[arg(long = "timegen", value_name = "NAME")]
    pub timegen: Option<String>,

    #[arg(long = "timeunit", value_enum, default_value = "days")]
    pub timeunit: UnitArg,

    /// Dose-like columns of the segment table.
    #[arg(long = "amounts", value_name = "COLS", value_delimiter = ',')]
    pub amounts: Vec<String>,

    /// Continuous columns of the segment table.
    #[arg(long = "levels", value_name = "COLS", value_delimiter = ',')]
    pub levels: Vec<String>,

    /// Event file columns copied onto every segment of a subject.
    #[arg(long = "keep", value_name = "COLS", value_delimiter = ',')]
    pub keep: Vec<String>,

    /// Print crude event rates per level of this column.
    #[arg(long = "rates", value_name = "COL")]
    pub rates: Option<String>,

    #[command(flatten)]
    pub common: CommonArgs,
}

fn parse_code_days(raw: &str) -> Result<(i64, u32), String> {
    let (code, days) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CODE=DAYS, got '{raw}'"))?;
    let code = code
        .trim()
        .parse()
        .map_err(|_| format!("invalid code '{code}'"))?;
    let days = days
        .trim()
        .parse()
        .map_err(|_| format!("invalid day count '{days}'"))?;
    Ok((code, days))
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FractionalArg {
    Floor,
    Round,
    Reject,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum UnitArg {
    Days,
    Weeks,
    Months,
    Quarters,
    Years,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EventKindArg {
    Single,
    Recurring,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TieArg {
    CompetingWins,
    PrimaryWins,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_code_days() {
        assert_eq!(parse_code_days("2=14"), Ok((2, 14)));
        assert!(parse_code_days("2:14").is_err());
        assert!(parse_code_days("x=1").is_err());
    }

    #[test]
    fn test_overlap_flags_are_exclusive() {
        let result = Cli::try_parse_from([
            "tvx",
            "expose",
            "--cohort",
            "c.csv",
            "--intervals",
            "i.csv",
            "--layer",
            "--split",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_priority_list() {
        let cli = Cli::try_parse_from([
            "tvx",
            "expose",
            "--cohort",
            "c.csv",
            "--intervals",
            "i.csv",
            "--priority",
            "3,1,2",
            "--window",
            "1,30",
        ])
        .unwrap();
        let Command::Expose(args) = cli.command else {
            panic!("expected expose");
        };
        assert_eq!(args.priority, Some(vec![3, 1, 2]));
        assert_eq!(args.window, Some(vec![1, 30]));
    }
}
