//! Maturity and refetch policy
//!
//! Decides, per item, whether cached data can be trusted given how long
//! delayed conversions take to land. [`decide_refetch`] is a pure function of
//! its inputs.
//!
//! - No latency model: `gaps_only`
//! - Window mode: every date on or after `reference - (ceil(t95) + 1)` is
//!   stale, so the tail is refetched as a `partial` decision
//! - Cohort mode: a cohort aggregate cannot be corrected in place, so any
//!   immature cohort replaces the whole slice

use chrono::{DateTime, NaiveDate, Utc};
use fetchplan_model::{days_before, DateRange, LatencyConfig, ParameterValue, SlotKind, TemporalMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why a cohort slice is replaced wholesale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaceReason {
    /// Some cohort is still inside its maturity horizon
    ImmatureCohorts,
    /// Every cohort is mature now, but some were captured while immature
    CapturedImmature,
}

/// Outcome of the refetch policy for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefetchDecision {
    /// Cached data is complete and mature
    UseCache,
    /// Only missing dates are fetched
    GapsOnly,
    /// The immature tail is refetched
    Partial {
        /// Dates to refetch
        refetch_window: DateRange,
        /// First immature date
        mature_cutoff: NaiveDate,
    },
    /// The whole slice is refetched
    ReplaceSlice {
        /// Why
        reason: ReplaceReason,
        /// Whether an immature cohort is present now
        has_immature_cohorts: bool,
    },
}

impl RefetchDecision {
    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::UseCache => "use_cache",
            Self::GapsOnly => "gaps_only",
            Self::Partial { .. } => "partial",
            Self::ReplaceSlice { .. } => "replace_slice",
        }
    }
}

/// Inputs of one policy evaluation
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    /// Slices the item is evaluated against (empty when nothing is cached)
    pub existing: &'a [&'a ParameterValue],
    /// Maturity model of the slot
    pub latency: Option<&'a LatencyConfig>,
    /// Slot kind, for cohort horizon conventions
    pub slot: Option<SlotKind>,
    /// Requested range
    pub requested: DateRange,
    /// Query mode
    pub mode: TemporalMode,
    /// Reference time
    pub reference_now: DateTime<Utc>,
    /// Whether coverage found no missing dates
    pub fully_covered: bool,
}

/// First immature date in window mode
#[must_use]
pub fn window_mature_cutoff(latency: &LatencyConfig, reference: NaiveDate) -> NaiveDate {
    days_before(reference, latency.window_horizon_days() + 1)
}

/// Cohort-mode maturity horizon in days
///
/// Probability slots use the anchor-to-edge horizon `path_t95` when it is
/// known, since it already spans every upstream onset. Otherwise, and for
/// cost or labour slots, the edge's own `t95` plus its onset delay applies.
#[must_use]
pub fn compute_effective_cohort_maturity(latency: &LatencyConfig, slot: Option<SlotKind>) -> f64 {
    let onset = latency.onset_delta_days.filter(|o| o.is_finite()).unwrap_or(0.0).max(0.0);
    let own = latency.t95.max(0.0) + onset;
    let is_probability = slot.map_or(true, |s| s.is_probability());
    match latency.path_t95 {
        Some(path) if is_probability && path.is_finite() && path > 0.0 => path.max(own),
        _ => own,
    }
}

fn cohort_dates(value: &ParameterValue) -> Vec<NaiveDate> {
    if value.dates.is_empty() {
        value.envelope().map(|e| e.days().collect()).unwrap_or_default()
    } else {
        value.dates.clone()
    }
}

#[allow(clippy::cast_precision_loss)]
fn age_days(later: NaiveDate, earlier: NaiveDate) -> f64 {
    (later - earlier).num_days() as f64
}

/// Decide how an item's cached data is refreshed
#[must_use]
pub fn decide_refetch(input: &PolicyInput<'_>) -> RefetchDecision {
    let Some(latency) = input.latency.filter(|l| l.is_valid()) else {
        return RefetchDecision::GapsOnly;
    };
    let reference = input.reference_now.date_naive();

    match input.mode {
        TemporalMode::Window => {
            let cutoff = window_mature_cutoff(latency, reference);
            if input.requested.end >= cutoff {
                let start = input.requested.start.max(cutoff);
                return RefetchDecision::Partial {
                    refetch_window: DateRange {
                        start,
                        end: input.requested.end,
                    },
                    mature_cutoff: cutoff,
                };
            }
            if input.fully_covered {
                RefetchDecision::UseCache
            } else {
                RefetchDecision::GapsOnly
            }
        }
        TemporalMode::Cohort => {
            if input.existing.is_empty() {
                return RefetchDecision::GapsOnly;
            }
            let horizon = compute_effective_cohort_maturity(latency, input.slot);
            let immature_now = input
                .existing
                .iter()
                .flat_map(|v| cohort_dates(v))
                .any(|date| age_days(reference, date) < horizon);
            if immature_now {
                return RefetchDecision::ReplaceSlice {
                    reason: ReplaceReason::ImmatureCohorts,
                    has_immature_cohorts: true,
                };
            }
            let captured_immature = input.existing.iter().any(|v| {
                v.retrieved_at.is_some_and(|at| {
                    let captured = at.date_naive();
                    cohort_dates(v)
                        .into_iter()
                        .any(|date| age_days(captured, date) < horizon)
                })
            });
            if captured_immature {
                return RefetchDecision::ReplaceSlice {
                    reason: ReplaceReason::CapturedImmature,
                    has_immature_cohorts: false,
                };
            }
            if input.fully_covered {
                RefetchDecision::UseCache
            } else {
                RefetchDecision::GapsOnly
            }
        }
    }
}

/// Dates a decision marks stale, excluding dates already missing
#[must_use]
pub fn stale_dates(
    decision: &RefetchDecision,
    requested: DateRange,
    missing: &BTreeSet<NaiveDate>,
) -> BTreeSet<NaiveDate> {
    match decision {
        RefetchDecision::UseCache | RefetchDecision::GapsOnly => BTreeSet::new(),
        RefetchDecision::Partial { refetch_window, .. } => refetch_window
            .intersect(&requested)
            .map(|w| w.days().filter(|d| !missing.contains(d)).collect())
            .unwrap_or_default(),
        RefetchDecision::ReplaceSlice { .. } => {
            requested.days().filter(|d| !missing.contains(d)).collect()
        }
    }
}

/// Note for a slice retrieved within `minutes` of reference now
#[must_use]
pub fn cooldown_note(
    existing: &[&ParameterValue],
    reference_now: DateTime<Utc>,
    minutes: i64,
) -> Option<String> {
    let latest = existing.iter().filter_map(|v| v.retrieved_at).max()?;
    let elapsed = reference_now - latest;
    if elapsed >= chrono::Duration::zero() && elapsed < chrono::Duration::minutes(minutes) {
        Some(format!(
            "retrieved {}m before reference time; a refetch may be throttled",
            elapsed.num_minutes()
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap()
    }

    fn input<'a>(
        existing: &'a [&'a ParameterValue],
        latency: Option<&'a LatencyConfig>,
        requested: DateRange,
        mode: TemporalMode,
    ) -> PolicyInput<'a> {
        PolicyInput {
            existing,
            latency,
            slot: Some(SlotKind::Base),
            requested,
            mode,
            reference_now: now(),
            fully_covered: true,
        }
    }

    #[test]
    fn no_latency_is_gaps_only() {
        let requested = DateRange::new(d(1, 1), d(1, 30)).unwrap();
        let decision = decide_refetch(&input(&[], None, requested, TemporalMode::Window));
        assert_eq!(decision, RefetchDecision::GapsOnly);
    }

    #[test]
    fn window_tail_is_partial() {
        let latency = LatencyConfig::new(7.0);
        let requested = DateRange::new(d(1, 1), d(1, 30)).unwrap();
        let decision = decide_refetch(&input(&[], Some(&latency), requested, TemporalMode::Window));
        // 31-Jan minus 8 days
        let cutoff = d(1, 23);
        assert_eq!(
            decision,
            RefetchDecision::Partial {
                refetch_window: DateRange::new(cutoff, d(1, 30)).unwrap(),
                mature_cutoff: cutoff,
            }
        );
        let stale = stale_dates(&decision, requested, &BTreeSet::from([d(1, 30)]));
        assert_eq!(stale.len(), 7);
        assert!(!stale.contains(&d(1, 30)));
    }

    #[test]
    fn mature_window_uses_cache() {
        let latency = LatencyConfig::new(3.0);
        let requested = DateRange::new(d(1, 1), d(1, 10)).unwrap();
        let decision = decide_refetch(&input(&[], Some(&latency), requested, TemporalMode::Window));
        assert_eq!(decision, RefetchDecision::UseCache);
    }

    #[test]
    fn cohort_with_immature_date_replaces() {
        let latency = LatencyConfig::new(7.0);
        let requested = DateRange::new(d(1, 1), d(1, 30)).unwrap();
        let value = ParameterValue {
            dates: requested.days().collect(),
            retrieved_at: Some(now() - chrono::Duration::days(1)),
            ..ParameterValue::cohort(requested)
        };
        let existing = [&value];
        let decision = decide_refetch(&input(&existing, Some(&latency), requested, TemporalMode::Cohort));
        assert_eq!(
            decision,
            RefetchDecision::ReplaceSlice {
                reason: ReplaceReason::ImmatureCohorts,
                has_immature_cohorts: true,
            }
        );
        assert_eq!(stale_dates(&decision, requested, &BTreeSet::new()).len(), 30);
    }

    #[test]
    fn cohort_captured_immature_replaces_without_flag() {
        let latency = LatencyConfig::new(7.0);
        let requested = DateRange::new(d(1, 1), d(1, 10)).unwrap();
        let value = ParameterValue {
            dates: requested.days().collect(),
            retrieved_at: Some(Utc.with_ymd_and_hms(2026, 1, 11, 0, 0, 0).unwrap()),
            ..ParameterValue::cohort(requested)
        };
        let existing = [&value];
        let decision = decide_refetch(&input(&existing, Some(&latency), requested, TemporalMode::Cohort));
        assert_eq!(
            decision,
            RefetchDecision::ReplaceSlice {
                reason: ReplaceReason::CapturedImmature,
                has_immature_cohorts: false,
            }
        );
    }

    #[test]
    fn cohort_horizon_prefers_path_for_probabilities() {
        let latency = LatencyConfig::new(5.0).with_onset(1.0).with_path_t95(12.0);
        assert!((compute_effective_cohort_maturity(&latency, Some(SlotKind::Base)) - 12.0).abs() < f64::EPSILON);
        assert!((compute_effective_cohort_maturity(&latency, Some(SlotKind::Cost)) - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cooldown_note_for_recent_fetch() {
        let requested = DateRange::new(d(1, 1), d(1, 2)).unwrap();
        let value = ParameterValue {
            retrieved_at: Some(now() - chrono::Duration::minutes(2)),
            ..ParameterValue::window(requested)
        };
        assert!(cooldown_note(&[&value], now(), 5).is_some());
        assert!(cooldown_note(&[&value], now(), 1).is_none());
    }
}
