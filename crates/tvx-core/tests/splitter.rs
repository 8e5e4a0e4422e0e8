//! Integration tests for exposure splitting.

use chrono::NaiveDate;

use tvx_core::{coverage, expose};
use tvx_model::{
    ExposeOptions, ExposureDefinition, GraceSpec, OverlapPolicy, RawInterval, Subject, TimeUnit,
    Value,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn leap_year_subject() -> Vec<Subject> {
    vec![Subject::new(1, date(2020, 1, 1), date(2020, 12, 31)).unwrap()]
}

fn rows(result: &tvx_core::ExposeResult) -> Vec<(NaiveDate, NaiveDate, Value)> {
    result
        .table
        .rows
        .iter()
        .map(|r| (r.start, r.stop, r.values[0].clone()))
        .collect()
}

#[test]
fn test_overlapping_same_type_intervals_merge() {
    let intervals = vec![
        RawInterval::new(1, date(2020, 1, 1), date(2020, 1, 30), 1.0),
        RawInterval::new(1, date(2020, 1, 21), date(2020, 2, 19), 1.0),
    ];
    let result = expose(&leap_year_subject(), &intervals, &ExposeOptions::new()).unwrap();

    assert_eq!(
        rows(&result),
        vec![
            (date(2020, 1, 1), date(2020, 2, 19), Value::Code(1)),
            (date(2020, 2, 20), date(2020, 12, 31), Value::Code(0)),
        ]
    );
    assert_eq!(result.summary.person_days, 366);
    assert_eq!(result.summary.non_reference_days, 50);
}

#[test]
fn test_duration_one_year_boundary() {
    let cohort = vec![Subject::new(1, date(2020, 1, 1), date(2021, 12, 31)).unwrap()];
    let options = ExposeOptions::new().with_definition(ExposureDefinition::Duration {
        thresholds: vec![1.0],
        unit: TimeUnit::Years,
    });

    // 2020-01-01 through 2020-12-30 is 365 days.
    let short = vec![RawInterval::new(1, date(2020, 1, 1), date(2020, 12, 30), 1.0)];
    let result = expose(&cohort, &short, &options).unwrap();
    assert_eq!(
        rows(&result),
        vec![(date(2020, 1, 1), date(2021, 12, 31), Value::Code(1))]
    );

    let long = vec![RawInterval::new(1, date(2020, 1, 1), date(2020, 12, 31), 1.0)];
    let result = expose(&cohort, &long, &options).unwrap();
    assert_eq!(
        rows(&result),
        vec![
            (date(2020, 1, 1), date(2020, 12, 30), Value::Code(1)),
            (date(2020, 12, 31), date(2021, 12, 31), Value::Code(2)),
        ]
    );
}

#[test]
fn test_grace_boundary() {
    // Gap between Jan 10 and Jan 16 is five days.
    let intervals = vec![
        RawInterval::new(1, date(2020, 1, 1), date(2020, 1, 10), 1.0),
        RawInterval::new(1, date(2020, 1, 16), date(2020, 1, 31), 1.0),
    ];
    let bridged = expose(
        &leap_year_subject(),
        &intervals,
        &ExposeOptions::new().with_grace(GraceSpec::uniform(5)),
    )
    .unwrap();
    assert_eq!(bridged.table.rows[0].stop, date(2020, 1, 31));

    let kept = expose(
        &leap_year_subject(),
        &intervals,
        &ExposeOptions::new().with_grace(GraceSpec::uniform(4)),
    )
    .unwrap();
    assert_eq!(kept.table.rows[0].stop, date(2020, 1, 10));
    assert_eq!(kept.table.rows[1].values[0], Value::Code(0));
}

#[test]
fn test_merge_boundary() {
    let intervals = vec![
        RawInterval::new(1, date(2020, 1, 1), date(2020, 1, 10), 1.0),
        RawInterval::new(1, date(2020, 1, 16), date(2020, 1, 31), 1.0),
    ];
    let merged = expose(
        &leap_year_subject(),
        &intervals,
        &ExposeOptions::new().with_merge(5),
    )
    .unwrap();
    assert_eq!(merged.table.len(), 2);

    let apart = expose(
        &leap_year_subject(),
        &intervals,
        &ExposeOptions::new().with_merge(4),
    )
    .unwrap();
    assert_eq!(apart.table.len(), 4);
}

#[test]
fn test_row_anomalies_leave_reference_timeline() {
    let intervals = vec![
        RawInterval::new(1, date(2020, 3, 1), date(2020, 2, 1), 1.0),
        RawInterval::new(1, date(2019, 1, 1), date(2019, 6, 30), 1.0),
    ];
    let result = expose(&leap_year_subject(), &intervals, &ExposeOptions::new()).unwrap();
    assert_eq!(result.table.len(), 1);
    assert_eq!(result.report.reversed, 1);
    assert_eq!(result.report.outside_window, 1);
}

#[test]
fn test_dose_total_conserved() {
    let intervals = vec![
        RawInterval::new(1, date(2020, 1, 1), date(2020, 1, 10), 100.0),
        RawInterval::new(1, date(2020, 1, 6), date(2020, 1, 25), 40.0),
    ];
    let options = ExposeOptions::new().with_overlap(OverlapPolicy::Dose);
    let result = expose(&leap_year_subject(), &intervals, &options).unwrap();
    let total: f64 = result
        .table
        .rows
        .iter()
        .filter_map(|r| r.values[0].as_f64())
        .sum();
    assert!((total - 140.0).abs() < 1e-9);
}

#[test]
fn test_split_policy_tiles_window() {
    let cohort = vec![
        Subject::new(1, date(2020, 1, 1), date(2020, 12, 31)).unwrap(),
        Subject::new(2, date(2020, 6, 1), date(2021, 5, 31)).unwrap(),
    ];
    let intervals = vec![
        RawInterval::new(1, date(2020, 2, 1), date(2020, 4, 30), 1.0),
        RawInterval::new(1, date(2020, 3, 1), date(2020, 5, 31), 2.0),
        RawInterval::new(2, date(2020, 5, 1), date(2020, 7, 31), 3.0),
    ];
    let options = ExposeOptions::new().with_overlap(OverlapPolicy::Split);
    let result = expose(&cohort, &intervals, &options).unwrap();
    assert!(coverage(&result.table, &cohort).iter().all(|c| c.is_exact()));
    assert!(
        result
            .table
            .rows
            .iter()
            .any(|r| r.values[0] == Value::Codes(vec![1, 2]))
    );
}

#[test]
fn test_lag_and_washout_shift_exposure() {
    let intervals = vec![RawInterval::new(1, date(2020, 3, 1), date(2020, 3, 31), 1.0)];
    let options = ExposeOptions::new().with_lag(10).with_washout(30);
    let result = expose(&leap_year_subject(), &intervals, &options).unwrap();
    assert_eq!(
        rows(&result)[1],
        (date(2020, 3, 11), date(2020, 4, 30), Value::Code(1))
    );
}
