//! Property tests for coverage completeness, staleness and cache busting

use chrono::{Duration, NaiveDate};
use fetchplan_core::prelude::*;
use fetchplan_core::{compute_coverage, decide_refetch, stale_dates, CoverageQuery, PolicyInput};
use fetchplan_test_utils::{jan, range, utc, ValueBuilder};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn day(offset: i64) -> NaiveDate {
    jan(1) + Duration::days(offset)
}

fn cached_days() -> impl Strategy<Value = BTreeSet<i64>> {
    proptest::collection::btree_set(0..40i64, 0..40)
}

fn slice_on(days: &BTreeSet<i64>) -> ParameterValue {
    let dates: Vec<NaiveDate> = days.iter().map(|d| day(*d)).collect();
    ValueBuilder::window(range(day(0), day(39)))
        .daily_on(&dates, 10, 1)
        .build()
}

proptest! {
    #[test]
    fn covered_and_missing_partition_the_request(
        cached in cached_days(),
        start in 0..30i64,
        len in 1..10i64,
    ) {
        let requested = range(day(start), day(start + len));
        let value = slice_on(&cached);
        let coverage = compute_coverage(&[&value], &CoverageQuery::new(requested));

        let mut union: BTreeSet<NaiveDate> = coverage.covered_dates(requested);
        for window in &coverage.fetch_windows {
            for d in window.days() {
                prop_assert!(union.insert(d), "date {} counted twice", d);
            }
        }
        let expected: BTreeSet<NaiveDate> = requested.days().collect();
        prop_assert_eq!(union, expected);
        prop_assert_eq!(coverage.needs_fetch, !coverage.missing_dates.is_empty());
    }

    #[test]
    fn bust_cache_fetches_full_range(cached in cached_days(), start in 0..30i64, len in 0..10i64) {
        let requested = range(day(start), day(start + len));
        let value = slice_on(&cached);
        let query = CoverageQuery::new(requested).with_bust_cache(true);
        let coverage = compute_coverage(&[&value], &query);
        prop_assert!(coverage.needs_fetch);
        prop_assert_eq!(coverage.fetch_windows, vec![requested]);
    }

    #[test]
    fn window_staleness_starts_at_cutoff(t95 in 0.0f64..20.0, end_offset in 0..40i64) {
        let now = utc(2026, 2, 10, 12);
        let requested = range(day(0), day(end_offset));
        let latency = LatencyConfig::new(t95);
        let decision = decide_refetch(&PolicyInput {
            existing: &[],
            latency: Some(&latency),
            slot: Some(SlotKind::Base),
            requested,
            mode: TemporalMode::Window,
            reference_now: now,
            fully_covered: true,
        });
        let stale = stale_dates(&decision, requested, &BTreeSet::new());

        #[allow(clippy::cast_possible_truncation)]
        let horizon = t95.ceil() as i64 + 1;
        let cutoff = now.date_naive() - Duration::days(horizon);
        for d in requested.days() {
            prop_assert_eq!(stale.contains(&d), d >= cutoff, "date {}", d);
        }
    }

    #[test]
    fn cohort_replaces_whole_slice_when_any_date_immature(t95 in 1.0f64..10.0, age in 0..10i64) {
        let requested = range(day(0), day(29));
        let now = utc(2026, 1, 30, 12) + Duration::days(age);
        let value = ValueBuilder::cohort(requested)
            .daily(10, 1)
            .retrieved_days_before(now, 1)
            .build();
        let latency = LatencyConfig::new(t95);
        let existing = [&value];
        let decision = decide_refetch(&PolicyInput {
            existing: &existing,
            latency: Some(&latency),
            slot: Some(SlotKind::Base),
            requested,
            mode: TemporalMode::Cohort,
            reference_now: now,
            fully_covered: true,
        });
        #[allow(clippy::cast_precision_loss)]
        let youngest = (now.date_naive() - day(29)).num_days() as f64;
        if youngest < t95 {
            let stale = stale_dates(&decision, requested, &BTreeSet::new());
            prop_assert_eq!(stale.len(), 30);
        } else {
            let is_immature_replace = matches!(
                decision,
                RefetchDecision::ReplaceSlice { has_immature_cohorts: true, .. }
            );
            prop_assert!(!is_immature_replace);
        }
    }
}
