//! `tvx`: time-varying exposure intervals from the command line.

use std::io::{self, IsTerminal};

use clap::{ColorChoice, Parser};
use tracing::level_filters::LevelFilter;
use tvx_cli::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use tvx_cli::commands::{error_code, run_event, run_expose, run_merge};
use tvx_cli::logging::{LogConfig, LogFormat, init_logging};

mod summary;

use crate::summary::{print_event_summary, print_expose_summary, print_merge_summary};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let outcome = match &cli.command {
        Command::Expose(args) => run_expose(args).map(|run| {
            if !args.common.quiet_summary {
                print_expose_summary(&run);
            }
        }),
        Command::Merge(args) => run_merge(args).map(|run| {
            if !args.common.quiet_summary {
                print_merge_summary(&run);
            }
        }),
        Command::Event(args) => run_event(args).map(|run| {
            if !args.common.quiet_summary {
                print_event_summary(&run);
            }
        }),
    };
    let exit_code = match outcome {
        Ok(()) => 0,
        Err(error) => {
            match error_code(&error) {
                Some(code) => eprintln!("error: {error:#} [code {code}]"),
                None => eprintln!("error: {error:#}"),
            }
            1
        }
    };
    std::process::exit(exit_code);
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
