//! Snapshot DB coverage widening
//!
//! The cache may be complete while the snapshot database lacks some dates.
//! When a probe is configured, dates it reports missing that are not already
//! in the item's windows are fetched as extra `db_missing` windows. Covered
//! items are probed too and run with `db_missing` windows alone.

use crate::error::SinkError;
use async_trait::async_trait;
use chrono::NaiveDate;
use fetchplan_model::{merge_into_ranges, FetchPlanItem, FetchWindow, WindowReason};
use std::collections::BTreeSet;

/// Reports dates missing from the snapshot database
#[async_trait]
pub trait DbCoverageProbe: Send + Sync {
    /// Dates of `item`'s requested range the database lacks
    async fn missing_dates(&self, item: &FetchPlanItem) -> Result<BTreeSet<NaiveDate>, SinkError>;
}

/// Item windows extended with `db_missing` windows
///
/// Dates already covered by a window are ignored, so windows never overlap.
#[must_use]
pub fn widen_windows(item: &FetchPlanItem, db_missing: &BTreeSet<NaiveDate>) -> Vec<FetchWindow> {
    let planned = item.fetch_dates();
    let extra: BTreeSet<NaiveDate> = db_missing.difference(&planned).copied().collect();
    let mut windows = item.windows.clone();
    windows.extend(
        merge_into_ranges(&extra)
            .into_iter()
            .map(|range| FetchWindow::new(range, WindowReason::DbMissing)),
    );
    windows.sort();
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchplan_model::{DateRange, ItemIdentity, SlotKind, TemporalMode};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    #[test]
    fn widening_skips_planned_dates() {
        let item = FetchPlanItem::fetch(
            ItemIdentity::parameter("p", "e", SlotKind::Base, TemporalMode::Window),
            vec![FetchWindow::new(DateRange::new(d(5), d(7)).unwrap(), WindowReason::Missing)],
        );
        let db_missing: BTreeSet<NaiveDate> = [d(1), d(2), d(6), d(8)].into_iter().collect();
        let windows = widen_windows(&item, &db_missing);
        let shape: Vec<(NaiveDate, NaiveDate, WindowReason)> =
            windows.iter().map(|w| (w.start, w.end, w.reason)).collect();
        assert_eq!(
            shape,
            vec![
                (d(1), d(2), WindowReason::DbMissing),
                (d(5), d(7), WindowReason::Missing),
                (d(8), d(8), WindowReason::DbMissing),
            ]
        );
    }
}
