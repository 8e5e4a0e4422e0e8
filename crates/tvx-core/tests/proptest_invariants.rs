//! Property tests: every split, merged and spliced table tiles each subject's
//! follow-up window exactly.

use chrono::{Days, NaiveDate};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

use tvx_core::{coverage, expose, merge, splice_events};
use tvx_model::{
    EventKind, EventOptions, EventRecord, ExposeOptions, ExposureDefinition, GraceSpec,
    MergeOptions, OverlapPolicy, RawInterval, Subject, TimeUnit, Value,
};

const MIN_PROPTEST_CASES: u32 = 256;

fn proptest_cases() -> u32 {
    std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|parsed| parsed.max(MIN_PROPTEST_CASES))
        .unwrap_or(MIN_PROPTEST_CASES)
}

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .checked_add_days(Days::new(offset))
        .unwrap()
}

fn cohort(length: u64) -> Vec<Subject> {
    vec![Subject::new(1, day(0), day(length)).unwrap()]
}

/// Intervals that may overlap or extend past the window.
fn intervals_strategy(max_value: u32) -> impl Strategy<Value = Vec<RawInterval>> {
    prop::collection::vec((0u64..420, 0u64..120, 0u32..=max_value), 0..12).prop_map(
        |raw| {
            raw.into_iter()
                .map(|(start, length, value)| {
                    RawInterval::new(1, day(start), day(start + length), f64::from(value))
                })
                .collect()
        },
    )
}

fn overlap_strategy() -> impl Strategy<Value = OverlapPolicy> {
    prop_oneof![
        Just(OverlapPolicy::Layer),
        Just(OverlapPolicy::Split),
        Just(OverlapPolicy::Priority(vec![3, 1, 2])),
    ]
}

fn definition_strategy() -> impl Strategy<Value = ExposureDefinition> {
    prop_oneof![
        Just(ExposureDefinition::TimeVarying),
        Just(ExposureDefinition::EverTreated),
        Just(ExposureDefinition::CurrentFormer),
        Just(ExposureDefinition::Duration {
            thresholds: vec![30.0, 90.0],
            unit: TimeUnit::Days,
        }),
        Just(ExposureDefinition::Continuous {
            unit: TimeUnit::Months,
        }),
        Just(ExposureDefinition::Recency {
            thresholds: vec![0.25],
        }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: proptest_cases(),
        .. ProptestConfig::default()
    })]

    #[test]
    fn split_tiles_window(
        length in 0u64..400,
        intervals in intervals_strategy(3),
        overlap in overlap_strategy(),
        definition in definition_strategy(),
        lag in 0u32..20,
        washout in 0u32..20,
        grace in 0u32..10,
        bytype in any::<bool>(),
        window in prop::option::of((0u32..30, 0u32..60)),
    ) {
        let cohort = cohort(length);
        let mut options = ExposeOptions::new()
            .with_overlap(overlap)
            .with_definition(definition)
            .with_lag(lag)
            .with_washout(washout)
            .with_grace(GraceSpec::uniform(grace))
            .with_bytype(bytype);
        if let Some((min, extra)) = window {
            options = options.with_window(min, min + extra);
        }
        let result = expose(&cohort, &intervals, &options).unwrap();
        let report = coverage(&result.table, &cohort);
        prop_assert!(report.iter().all(|c| c.is_exact()), "{report:?}");
        prop_assert_eq!(result.summary.person_days, cohort[0].days());
        for pair in result.table.rows.windows(2) {
            prop_assert_eq!(pair[0].stop.succ_opt().unwrap(), pair[1].start);
        }
    }

    #[test]
    fn ever_treated_never_decreases(intervals in intervals_strategy(2)) {
        let options = ExposeOptions::new().with_definition(ExposureDefinition::EverTreated);
        let result = expose(&cohort(365), &intervals, &options).unwrap();
        let flags: Vec<i64> = result
            .table
            .rows
            .iter()
            .filter_map(|r| r.values[0].as_code())
            .collect();
        prop_assert!(flags.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn dose_is_conserved(intervals in intervals_strategy(50)) {
        // Wide enough that no interval is clipped.
        let cohort = cohort(600);
        let options = ExposeOptions::new().with_overlap(OverlapPolicy::Dose);
        let result = expose(&cohort, &intervals, &options).unwrap();
        let expected: f64 = intervals.iter().map(|i| i.value).sum();
        let total: f64 = result
            .table
            .rows
            .iter()
            .filter_map(|r| r.values[0].as_f64())
            .sum();
        prop_assert!((total - expected).abs() < 1e-6 * expected.max(1.0));
    }

    #[test]
    fn merge_and_events_keep_partition(
        a in intervals_strategy(2),
        b in intervals_strategy(50),
        event in prop::option::of(0u64..400),
        recurring in any::<bool>(),
    ) {
        let cohort = cohort(365);
        let first = expose(&cohort, &a, &ExposeOptions::new()).unwrap().table;
        let second = expose(
            &cohort,
            &b,
            &ExposeOptions::new()
                .with_overlap(OverlapPolicy::Dose)
                .with_generate("dose"),
        )
        .unwrap()
        .table;
        let second_total: f64 = second.rows.iter().filter_map(|r| r.values[0].as_f64()).sum();

        let merged = merge(&[first, second], &MergeOptions::new()).unwrap().table;
        prop_assert!(coverage(&merged, &cohort).iter().all(|c| c.is_exact()));
        let merged_total: f64 = merged.rows.iter().filter_map(|r| r.values[1].as_f64()).sum();
        prop_assert!((merged_total - second_total).abs() < 1e-6 * second_total.max(1.0));

        let kind = if recurring { EventKind::Recurring } else { EventKind::Single };
        let events = [EventRecord::new(1, event.map(day))];
        let spliced = splice_events(&merged, &events, &EventOptions::new().with_kind(kind))
            .unwrap()
            .table;
        let flagged = spliced
            .rows
            .iter()
            .filter(|r| r.values[2] != Value::Code(0))
            .count();
        prop_assert!(flagged <= 1);
        if recurring || flagged == 0 {
            prop_assert!(coverage(&spliced, &cohort).iter().all(|c| c.is_exact()));
        }
        for pair in spliced.rows.windows(2) {
            prop_assert_eq!(pair[0].stop.succ_opt().unwrap(), pair[1].start);
        }
    }
}
