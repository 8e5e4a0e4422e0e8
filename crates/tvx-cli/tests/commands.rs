//! End-to-end runs of the three subcommands on files in a temp directory.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use tempfile::TempDir;

use tvx_cli::cli::{Cli, Command};
use tvx_cli::commands::{error_code, run_event, run_expose, run_merge};

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn parse(argv: &[&str]) -> Command {
    let mut full = vec!["tvx"];
    full.extend_from_slice(argv);
    Cli::try_parse_from(full).unwrap().command
}

fn cohort(dir: &Path) -> PathBuf {
    write(
        dir,
        "cohort.csv",
        "id,entry,exit\n1,2020-01-01,2020-12-31\n2,2020-01-01,2020-06-30\n",
    )
}

#[test]
fn test_expose_merge_event_pipeline() {
    let dir = TempDir::new().unwrap();
    let cohort = cohort(dir.path());
    let statins = write(
        dir.path(),
        "statins.csv",
        "id,start,stop,value\n1,2020-01-01,2020-01-30,1\n1,2020-01-21,2020-02-19,1\n",
    );
    let doses = write(
        dir.path(),
        "doses.csv",
        "id,start,stop,value\n2,2020-03-01,2020-03-10,100\n",
    );
    let events = write(dir.path(), "events.csv", "id,date\n1,2020-02-10\n2,\n");
    let split_a = dir.path().join("a.csv");
    let split_b = dir.path().join("b.csv");
    let merged = dir.path().join("merged.csv");
    let spliced = dir.path().join("spliced.csv");

    let Command::Expose(args) = parse(&[
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        statins.to_str().unwrap(),
        "--generate",
        "statin",
        "--check",
        "--output",
        split_a.to_str().unwrap(),
    ]) else {
        panic!("expected expose");
    };
    let run = run_expose(&args).unwrap();
    assert_eq!(run.result.summary.non_reference_days, 50);
    assert!(run.coverage.unwrap().iter().all(|c| c.is_exact()));
    let text = fs::read_to_string(&split_a).unwrap();
    assert!(text.starts_with("id,start,stop,statin\n"));
    assert!(text.contains("1,2020-01-01,2020-02-19,1\n"));

    let Command::Expose(args) = parse(&[
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        doses.to_str().unwrap(),
        "--dose",
        "--generate",
        "dose",
        "--output",
        split_b.to_str().unwrap(),
    ]) else {
        panic!("expected expose");
    };
    run_expose(&args).unwrap();

    let Command::Merge(args) = parse(&[
        "merge",
        split_a.to_str().unwrap(),
        split_b.to_str().unwrap(),
        "--amounts",
        "dose",
        "--output",
        merged.to_str().unwrap(),
    ]) else {
        panic!("expected merge");
    };
    let run = run_merge(&args).unwrap();
    assert_eq!(run.inputs, 2);
    assert_eq!(run.result.summary.persons, 2);
    assert_eq!(run.result.table.person_days(), 366 + 182);
    let dose_col = run.result.table.column_index("dose").unwrap();
    let total_dose: f64 = run
        .result
        .table
        .rows
        .iter()
        .filter_map(|row| row.values[dose_col].as_f64())
        .sum();
    assert!((total_dose - 100.0).abs() < 1e-9);

    let Command::Event(args) = parse(&[
        "event",
        "--segments",
        merged.to_str().unwrap(),
        "--events",
        events.to_str().unwrap(),
        "--amounts",
        "dose",
        "--rates",
        "statin",
        "--output",
        spliced.to_str().unwrap(),
    ]) else {
        panic!("expected event");
    };
    let run = run_event(&args).unwrap();
    assert_eq!(run.result.summary.events(), 1);
    let rates = run.rates.unwrap();
    assert_eq!(rates.total_events(), 1);
    let text = fs::read_to_string(&spliced).unwrap();
    assert!(text.starts_with("id,start,stop,statin,dose,_failure\n"));
    assert!(text.contains("1,2020-02-10,2020-02-10,1,0,1\n"));
}

#[test]
fn test_existing_output_needs_replace() {
    let dir = TempDir::new().unwrap();
    let cohort = cohort(dir.path());
    let intervals = write(dir.path(), "i.csv", "id,start,stop,value\n1,2020-03-01,2020-03-31,2\n");
    let output = write(dir.path(), "out.csv", "keep me\n");
    let argv = [
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        intervals.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ];

    let Command::Expose(args) = parse(&argv) else {
        panic!("expected expose");
    };
    let err = run_expose(&args).unwrap_err();
    assert_eq!(error_code(&err), Some(110));
    assert_eq!(fs::read_to_string(&output).unwrap(), "keep me\n");

    let mut with_replace = argv.to_vec();
    with_replace.push("--replace");
    let Command::Expose(args) = parse(&with_replace) else {
        panic!("expected expose");
    };
    run_expose(&args).unwrap();
    insta::assert_snapshot!(fs::read_to_string(&output).unwrap(), @r"
    id,start,stop,tv_exposure
    1,2020-01-01,2020-02-29,0
    1,2020-03-01,2020-03-31,2
    1,2020-04-01,2020-12-31,0
    2,2020-01-01,2020-06-30,0
    ");
}

#[test]
fn test_config_file_with_flag_override() {
    let dir = TempDir::new().unwrap();
    let cohort = cohort(dir.path());
    let intervals = write(
        dir.path(),
        "i.csv",
        "id,start,stop,value\n1,2020-01-01,2020-01-10,1\n1,2020-01-16,2020-01-31,1\n",
    );
    let config = write(
        dir.path(),
        "options.json",
        r#"{ "expose": { "grace": { "default": 5 }, "generate": "drug" } }"#,
    );
    let output = dir.path().join("out.csv");

    let Command::Expose(args) = parse(&[
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        intervals.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--grace",
        "4",
        "--output",
        output.to_str().unwrap(),
    ]) else {
        panic!("expected expose");
    };
    run_expose(&args).unwrap();
    let text = fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("id,start,stop,drug\n"));
    // a 5-day gap is not bridged by a 4-day grace period
    assert!(text.contains("1,2020-01-11,2020-01-15,0\n"));
}

#[test]
fn test_error_codes_reach_the_caller() {
    let dir = TempDir::new().unwrap();
    let cohort = cohort(dir.path());
    let missing = dir.path().join("missing.csv");
    let Command::Expose(args) = parse(&[
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        missing.to_str().unwrap(),
        "--output",
        dir.path().join("out.csv").to_str().unwrap(),
    ]) else {
        panic!("expected expose");
    };
    let err = run_expose(&args).unwrap_err();
    assert_eq!(error_code(&err), Some(601));

    let no_value = write(dir.path(), "nv.csv", "id,start,stop\n1,2020-01-01,2020-01-02\n");
    let Command::Expose(args) = parse(&[
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        no_value.to_str().unwrap(),
        "--output",
        dir.path().join("out.csv").to_str().unwrap(),
    ]) else {
        panic!("expected expose");
    };
    let err = run_expose(&args).unwrap_err();
    assert_eq!(error_code(&err), Some(111));
}

#[test]
fn test_existing_output_checked_before_reading_inputs() {
    let dir = TempDir::new().unwrap();
    let output = write(dir.path(), "out.csv", "id,start,stop,x\n");
    let missing = dir.path().join("missing.csv");
    let Command::Merge(args) = parse(&[
        "merge",
        missing.to_str().unwrap(),
        missing.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ]) else {
        panic!("expected merge");
    };
    let err = run_merge(&args).unwrap_err();
    assert_eq!(error_code(&err), Some(110));

    let Command::Event(args) = parse(&[
        "event",
        "--segments",
        missing.to_str().unwrap(),
        "--events",
        missing.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
    ]) else {
        panic!("expected event");
    };
    let err = run_event(&args).unwrap_err();
    assert_eq!(error_code(&err), Some(110));
    assert_eq!(fs::read_to_string(&output).unwrap(), "id,start,stop,x\n");
}

#[test]
fn test_keep_columns_follow_each_subject() {
    let dir = TempDir::new().unwrap();
    let cohort = write(
        dir.path(),
        "cohort.csv",
        "id,entry,exit,sex\n1,2020-01-01,2020-12-31,2\n2,2020-01-01,2020-06-30,1\n",
    );
    let intervals = write(dir.path(), "i.csv", "id,start,stop,value\n1,2020-03-01,2020-03-31,2\n");
    let events = write(
        dir.path(),
        "events.csv",
        "id,date,region\n1,2020-03-15,north\n2,,south\n1,,west\n",
    );
    let split = dir.path().join("split.csv");
    let spliced = dir.path().join("spliced.csv");

    let Command::Expose(args) = parse(&[
        "expose",
        "--cohort",
        cohort.to_str().unwrap(),
        "--intervals",
        intervals.to_str().unwrap(),
        "--keep",
        "sex",
        "--keepdates",
        "--output",
        split.to_str().unwrap(),
    ]) else {
        panic!("expected expose");
    };
    let run = run_expose(&args).unwrap();
    assert_eq!(run.without_covariates, 0);
    insta::assert_snapshot!(fs::read_to_string(&split).unwrap(), @r"
    id,start,stop,tv_exposure,study_entry,study_exit,sex
    1,2020-01-01,2020-02-29,0,2020-01-01,2020-12-31,2
    1,2020-03-01,2020-03-31,2,2020-01-01,2020-12-31,2
    1,2020-04-01,2020-12-31,0,2020-01-01,2020-12-31,2
    2,2020-01-01,2020-06-30,0,2020-01-01,2020-06-30,1
    ");

    let Command::Event(args) = parse(&[
        "event",
        "--segments",
        split.to_str().unwrap(),
        "--events",
        events.to_str().unwrap(),
        "--keep",
        "region",
        "--output",
        spliced.to_str().unwrap(),
    ]) else {
        panic!("expected event");
    };
    let run = run_event(&args).unwrap();
    assert_eq!(run.without_covariates, 0);
    let text = fs::read_to_string(&spliced).unwrap();
    assert!(text.starts_with(
        "id,start,stop,tv_exposure,study_entry,study_exit,sex,_failure,region\n"
    ));
    assert!(text.contains("1,2020-03-15,2020-03-15,2,2020-01-01,2020-12-31,2,1,north\n"));
    assert!(text.contains("2,2020-01-01,2020-06-30,0,2020-01-01,2020-06-30,1,0,south\n"));
    assert!(!text.contains("west"));
}
