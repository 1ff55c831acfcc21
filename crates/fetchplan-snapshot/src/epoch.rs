//! Cohort-maturity epoch segmentation
//!
//! A sweep of retrievals may cross regime changes: one week the source was
//! fetched per channel, the next uncontexted. Reading one slice-key set
//! across the whole sweep would mix regimes, so the sweep is split into
//! epochs, each a maximal run of days that used one consistent selection.

use crate::config::UncontextedSliceKeyPolicy;
use crate::summary::RetrievalRow;
use chrono::{DateTime, NaiveDate, Utc};
use fetchplan_core::{select_partition, ContextRegistry};
use fetchplan_model::{slice_key, ContextMap, DateRange, SliceDsl, TemporalMode};
use std::collections::{BTreeMap, BTreeSet};

/// Snapshot slice key for a context map
#[must_use]
pub fn subject_slice_key(
    contexts: &ContextMap,
    mode: TemporalMode,
    policy: UncontextedSliceKeyPolicy,
) -> String {
    match (contexts.is_empty(), policy) {
        (true, UncontextedSliceKeyPolicy::Empty) => String::new(),
        _ => slice_key(contexts, mode),
    }
}

/// One contiguous run of days sharing a slice-key selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    /// Days covered
    pub range: DateRange,
    /// Selected keys, or `None` for a gap
    pub slice_keys: Option<Vec<String>>,
}

/// Chooses the least-aggregated key set answering a query
pub struct EpochSelector<'a> {
    /// Partition policy source
    pub registry: &'a dyn ContextRegistry,
    /// Query constraints
    pub query: &'a ContextMap,
    /// Requested mode; keys of the other mode are ignored
    pub mode: TemporalMode,
    /// Uncontexted key convention
    pub policy: UncontextedSliceKeyPolicy,
    /// Dimension bound
    pub max_dimensions: usize,
}

impl std::fmt::Debug for EpochSelector<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochSelector")
            .field("query", &self.query)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl EpochSelector<'_> {
    /// Selection for one day's stored keys
    #[must_use]
    pub fn select(&self, keys: &BTreeSet<String>) -> Option<Vec<String>> {
        let candidates: Vec<ContextMap> = keys
            .iter()
            .filter_map(|key| {
                if key.is_empty() {
                    return Some(ContextMap::new());
                }
                let dsl = SliceDsl::parse(key).ok()?;
                match dsl.mode {
                    Some(mode) if mode != self.mode => None,
                    _ => Some(dsl.contexts),
                }
            })
            .collect();
        let partition =
            select_partition(&candidates, self.query, self.registry, self.max_dimensions).ok()?;
        let mut selected: Vec<String> = partition
            .members
            .iter()
            .map(|ctx| subject_slice_key(ctx, self.mode, self.policy))
            .collect();
        selected.sort();
        Some(selected)
    }
}

/// Latest retrieval group per calendar day within `sweep`
#[must_use]
pub fn latest_groups(rows: &[RetrievalRow], sweep: DateRange) -> BTreeMap<NaiveDate, BTreeSet<String>> {
    let mut latest: BTreeMap<NaiveDate, (DateTime<Utc>, BTreeSet<String>)> = BTreeMap::new();
    for row in rows {
        let day = row.retrieved_at.date_naive();
        if !sweep.contains(day) {
            continue;
        }
        let entry = latest
            .entry(day)
            .or_insert_with(|| (row.retrieved_at, BTreeSet::new()));
        if row.retrieved_at > entry.0 {
            *entry = (row.retrieved_at, BTreeSet::new());
        }
        if row.retrieved_at == entry.0 {
            entry.1.insert(row.slice_key.clone());
        }
    }
    latest.into_iter().map(|(day, (_, keys))| (day, keys)).collect()
}

/// Split `sweep` into epochs
///
/// Each observed day uses its latest retrieval group; unobserved days carry
/// the previous day's selection forward. Days before the first observation,
/// or whose selection is unsafe, become gap epochs.
#[must_use]
pub fn segment_epochs(rows: &[RetrievalRow], sweep: DateRange, selector: &EpochSelector<'_>) -> Vec<Epoch> {
    let groups = latest_groups(rows, sweep);
    let mut epochs: Vec<Epoch> = Vec::new();
    let mut carried: Option<Vec<String>> = None;

    for day in sweep.days() {
        if let Some(keys) = groups.get(&day) {
            carried = selector.select(keys);
        }
        match epochs.last_mut() {
            Some(last) if last.slice_keys == carried => last.range.end = day,
            _ => epochs.push(Epoch {
                range: DateRange::single(day),
                slice_keys: carried.clone(),
            }),
        }
    }
    epochs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fetchplan_core::{ContextDefinition, OtherPolicy, StaticContextRegistry};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, day, hour, 0, 0).unwrap()
    }

    fn feb(from: u32, to: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2026, 2, from).unwrap(),
            NaiveDate::from_ymd_opt(2026, 2, to).unwrap(),
        )
        .unwrap()
    }

    fn registry() -> StaticContextRegistry {
        std::iter::once(
            ContextDefinition::new("channel", &["google", "meta"]).with_other_policy(OtherPolicy::Explicit),
        )
        .collect()
    }

    #[test]
    fn latest_group_wins_within_a_day() {
        let rows = vec![
            RetrievalRow::new(at(1, 6), "cohort()"),
            RetrievalRow::new(at(1, 18), "context(channel:google).cohort()"),
        ];
        let groups = latest_groups(&rows, feb(1, 3));
        assert_eq!(groups.len(), 1);
        assert!(groups[&feb(1, 1).start].contains("context(channel:google).cohort()"));
    }

    #[test]
    fn regime_change_splits_epochs() {
        let registry = registry();
        let query = ContextMap::new();
        let selector = EpochSelector {
            registry: &registry,
            query: &query,
            mode: TemporalMode::Cohort,
            policy: UncontextedSliceKeyPolicy::ModeClause,
            max_dimensions: 4,
        };
        let mut rows = vec![RetrievalRow::new(at(2, 9), "cohort()")];
        for channel in ["google", "meta", "other"] {
            rows.push(RetrievalRow::new(at(4, 9), format!("context(channel:{channel}).cohort()")));
        }
        // window-mode keys never satisfy a cohort read
        rows.push(RetrievalRow::new(at(6, 9), "window()"));

        let epochs = segment_epochs(&rows, feb(1, 6), &selector);
        assert_eq!(epochs.len(), 4);
        assert_eq!(epochs[0], Epoch { range: feb(1, 1), slice_keys: None });
        assert_eq!(epochs[1].range, feb(2, 3));
        assert_eq!(epochs[1].slice_keys, Some(vec!["cohort()".to_string()]));
        assert_eq!(epochs[2].range, feb(4, 5));
        assert_eq!(epochs[2].slice_keys.as_ref().map(Vec::len), Some(3));
        assert_eq!(epochs[3], Epoch { range: feb(6, 6), slice_keys: None });
    }

    #[test]
    fn incomplete_partition_is_a_gap() {
        let registry = registry();
        let query = ContextMap::new();
        let selector = EpochSelector {
            registry: &registry,
            query: &query,
            mode: TemporalMode::Cohort,
            policy: UncontextedSliceKeyPolicy::Empty,
            max_dimensions: 4,
        };
        let rows = vec![RetrievalRow::new(at(1, 9), "context(channel:google).cohort()")];
        let epochs = segment_epochs(&rows, feb(1, 2), &selector);
        assert_eq!(epochs, vec![Epoch { range: feb(1, 2), slice_keys: None }]);
    }
}
