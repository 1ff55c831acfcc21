//! Property tests for plan canonicalisation and window construction

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use fetchplan_model::prelude::*;
use fetchplan_model::{build_windows, plans_equal};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

fn reason_strategy() -> impl Strategy<Value = WindowReason> {
    prop_oneof![
        Just(WindowReason::Missing),
        Just(WindowReason::Stale),
        Just(WindowReason::DbMissing),
    ]
}

fn reason_map_strategy() -> impl Strategy<Value = BTreeMap<NaiveDate, WindowReason>> {
    proptest::collection::btree_map(0..60i64, reason_strategy(), 0..40).prop_map(|m| {
        m.into_iter()
            .map(|(offset, reason)| (base() + Duration::days(offset), reason))
            .collect()
    })
}

fn item_for(index: usize, reasons: &BTreeMap<NaiveDate, WindowReason>) -> FetchPlanItem {
    let identity = ItemIdentity::parameter(
        format!("param-{index}"),
        format!("edge-{index}"),
        SlotKind::Base,
        TemporalMode::Window,
    );
    FetchPlanItem::fetch(identity, build_windows(reasons))
}

proptest! {
    #[test]
    fn windows_reproduce_reason_map(reasons in reason_map_strategy()) {
        let windows = build_windows(&reasons);

        let mut rebuilt = BTreeMap::new();
        for window in &windows {
            prop_assert_eq!(window.day_count, window.range().day_count());
            for day in window.range().days() {
                prop_assert!(rebuilt.insert(day, window.reason).is_none());
            }
        }
        prop_assert_eq!(rebuilt, reasons);

        for pair in windows.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
    }

    #[test]
    fn canonicalise_is_idempotent(
        maps in proptest::collection::vec(reason_map_strategy(), 1..6),
        seed in any::<u64>(),
    ) {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut items: Vec<FetchPlanItem> =
            maps.iter().enumerate().map(|(i, m)| item_for(i, m)).collect();
        let shift = usize::try_from(seed % items.len() as u64).unwrap();
        items.rotate_left(shift);
        for item in &mut items {
            item.windows.reverse();
        }

        let plan = FetchPlan::new(now, now, "window(1-Jan-26:1-Mar-26)", items, Vec::new());
        prop_assert!(plan.validate().is_ok());

        let once = plan.to_canonical_json().unwrap();
        let again = plan.clone().canonicalise().to_canonical_json().unwrap();
        prop_assert_eq!(&once, &again);

        let mut shuffled = plan.clone();
        shuffled.items.reverse();
        prop_assert!(plans_equal(&plan, &shuffled));
    }
}

#[test]
fn created_at_does_not_affect_equality() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    let mut reasons = BTreeMap::new();
    reasons.insert(base(), WindowReason::Missing);
    let a = FetchPlan::new(now, now, "window(1-Jan-26:1-Jan-26)", vec![item_for(0, &reasons)], Vec::new());
    let mut b = a.clone();
    b.created_at = now + Duration::hours(2);
    assert!(plans_equal(&a, &b));

    b.reference_now = now + Duration::hours(2);
    assert!(!plans_equal(&a, &b));
}
