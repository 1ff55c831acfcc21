//! Fetch plan model
//!
//! Canonical, order-independent representation of a fetch plan. A plan is
//! built once and never mutated afterwards; [`FetchPlan::canonicalise`] sorts
//! items by key and windows by date so that two plans with the same meaning
//! serialize to the same bytes.
//!
//! # Invariants
//!
//! - `windows` is non-empty iff `classification == Fetch`
//! - windows are sorted ascending and never overlap
//! - each date appears in at most one window, with exactly one reason

use crate::date::DateRange;
use crate::dsl::TemporalMode;
use crate::error::ModelError;
use crate::graph::{ItemType, SlotKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Current plan format version
pub const PLAN_VERSION: u32 = 1;

/// Why a window must be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowReason {
    /// Not present in the cache
    Missing,
    /// Present but not yet mature
    Stale,
    /// Present in the cache but absent from the snapshot DB
    DbMissing,
}

impl WindowReason {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Stale => "stale",
            Self::DbMissing => "db_missing",
        }
    }
}

/// Inclusive calendar range to fetch, with its reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
    /// Why the range is fetched
    pub reason: WindowReason,
    /// Number of days in the range
    pub day_count: u32,
}

impl FetchWindow {
    /// Window over `range`
    #[must_use]
    pub fn new(range: DateRange, reason: WindowReason) -> Self {
        Self {
            start: range.start,
            end: range.end,
            reason,
            day_count: range.day_count(),
        }
    }

    /// The window's range
    #[inline]
    #[must_use]
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.end,
        }
    }
}

/// Run-length encode a per-date reason map into windows
///
/// Consecutive days sharing a reason form one window; a change of reason or a
/// calendar gap starts a new one.
#[must_use]
pub fn build_windows(reasons: &BTreeMap<NaiveDate, WindowReason>) -> Vec<FetchWindow> {
    let mut windows: Vec<FetchWindow> = Vec::new();
    for (&day, &reason) in reasons {
        match windows.last_mut() {
            Some(last) if last.reason == reason && (day - last.end).num_days() == 1 => {
                last.end = day;
                last.day_count += 1;
            }
            _ => windows.push(FetchWindow::new(DateRange::single(day), reason)),
        }
    }
    windows
}

/// Outcome of planning one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Has windows to fetch and a connection to fetch them with
    Fetch,
    /// Nothing to fetch
    Covered,
    /// Needs data that cannot be fetched
    Unfetchable,
}

impl Classification {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Covered => "covered",
            Self::Unfetchable => "unfetchable",
        }
    }
}

/// Why an item cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfetchableReason {
    /// No connection and no backing file
    NoFile,
    /// No connection and the file lacks the requested data
    InsufficientFileData,
    /// Neither edge endpoint has an event id
    NoEventIds,
    /// One edge endpoint lacks an event id
    PartialEventIds,
}

impl UnfetchableReason {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoFile => "no_file",
            Self::InsufficientFileData => "insufficient_file_data",
            Self::NoEventIds => "no_event_ids",
            Self::PartialEventIds => "partial_event_ids",
        }
    }
}

/// Canonical item key: `type:objectId:targetId:slot:conditionalIndex`
#[must_use]
pub fn item_key(
    item_type: ItemType,
    object_id: &str,
    target_id: &str,
    slot: Option<SlotKind>,
) -> String {
    let slot_name = slot.map(|s| s.slot_name()).unwrap_or_default();
    let index = slot
        .and_then(|s| s.conditional_index())
        .map(|i| i.to_string())
        .unwrap_or_default();
    format!(
        "{}:{object_id}:{target_id}:{slot_name}:{index}",
        item_type.as_str()
    )
}

/// Identity and query scope of one planning unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIdentity {
    /// Parameter or case
    pub item_type: ItemType,
    /// Backing file id
    pub object_id: String,
    /// Edge or node uuid the unit hangs off
    pub target_id: String,
    /// Parameter slot, for parameter items
    pub slot: Option<SlotKind>,
    /// Temporal mode of the query
    pub mode: TemporalMode,
    /// Canonical slice family of the query
    pub slice_family: String,
    /// Query signature (empty when unsigned)
    pub query_signature: String,
}

impl ItemIdentity {
    /// Parameter slot identity
    #[must_use]
    pub fn parameter(
        object_id: impl Into<String>,
        target_id: impl Into<String>,
        slot: SlotKind,
        mode: TemporalMode,
    ) -> Self {
        Self {
            item_type: ItemType::Parameter,
            object_id: object_id.into(),
            target_id: target_id.into(),
            slot: Some(slot),
            mode,
            slice_family: String::new(),
            query_signature: String::new(),
        }
    }

    /// Case identity
    #[must_use]
    pub fn case(
        object_id: impl Into<String>,
        target_id: impl Into<String>,
        mode: TemporalMode,
    ) -> Self {
        Self {
            item_type: ItemType::Case,
            object_id: object_id.into(),
            target_id: target_id.into(),
            slot: None,
            mode,
            slice_family: String::new(),
            query_signature: String::new(),
        }
    }

    /// With slice family
    #[must_use]
    pub fn with_slice_family(mut self, family: impl Into<String>) -> Self {
        self.slice_family = family.into();
        self
    }

    /// With query signature
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.query_signature = signature.into();
        self
    }

    /// Canonical key
    #[must_use]
    pub fn item_key(&self) -> String {
        item_key(self.item_type, &self.object_id, &self.target_id, self.slot)
    }
}

/// One planning unit in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPlanItem {
    /// Canonical key
    pub item_key: String,
    /// Parameter or case
    pub item_type: ItemType,
    /// Backing file id
    pub object_id: String,
    /// Edge or node uuid
    pub target_id: String,
    /// Slot name, for parameter items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Conditional index, for conditional slots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_index: Option<usize>,
    /// Temporal mode
    pub mode: TemporalMode,
    /// Canonical slice family
    pub slice_family: String,
    /// Query signature
    pub query_signature: String,
    /// Planning outcome
    pub classification: Classification,
    /// Reason, for unfetchable items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unfetchable_reason: Option<UnfetchableReason>,
    /// Windows to fetch, for fetch items
    #[serde(default)]
    pub windows: Vec<FetchWindow>,
}

impl FetchPlanItem {
    fn from_identity(
        identity: ItemIdentity,
        classification: Classification,
        unfetchable_reason: Option<UnfetchableReason>,
        windows: Vec<FetchWindow>,
    ) -> Self {
        Self {
            item_key: identity.item_key(),
            item_type: identity.item_type,
            object_id: identity.object_id,
            target_id: identity.target_id,
            slot: identity.slot.map(|s| s.slot_name().to_string()),
            conditional_index: identity.slot.and_then(|s| s.conditional_index()),
            mode: identity.mode,
            slice_family: identity.slice_family,
            query_signature: identity.query_signature,
            classification,
            unfetchable_reason,
            windows,
        }
    }

    /// Item that fetches `windows`; an empty window list yields a covered item
    #[must_use]
    pub fn fetch(identity: ItemIdentity, mut windows: Vec<FetchWindow>) -> Self {
        if windows.is_empty() {
            return Self::covered(identity);
        }
        windows.sort();
        Self::from_identity(identity, Classification::Fetch, None, windows)
    }

    /// Item with nothing to fetch
    #[must_use]
    pub fn covered(identity: ItemIdentity) -> Self {
        Self::from_identity(identity, Classification::Covered, None, Vec::new())
    }

    /// Item that cannot be fetched
    #[must_use]
    pub fn unfetchable(identity: ItemIdentity, reason: UnfetchableReason) -> Self {
        Self::from_identity(identity, Classification::Unfetchable, Some(reason), Vec::new())
    }

    /// Slot kind, rebuilt from the flattened fields
    #[must_use]
    pub fn slot_kind(&self) -> Option<SlotKind> {
        self.slot
            .as_deref()
            .and_then(|s| SlotKind::from_parts(s, self.conditional_index))
    }

    /// Identity of this item
    #[must_use]
    pub fn identity(&self) -> ItemIdentity {
        ItemIdentity {
            item_type: self.item_type,
            object_id: self.object_id.clone(),
            target_id: self.target_id.clone(),
            slot: self.slot_kind(),
            mode: self.mode,
            slice_family: self.slice_family.clone(),
            query_signature: self.query_signature.clone(),
        }
    }

    /// Total days across all windows
    #[must_use]
    pub fn total_days(&self) -> u32 {
        self.windows.iter().map(|w| w.day_count).sum()
    }

    /// Every date covered by a window
    #[must_use]
    pub fn fetch_dates(&self) -> BTreeSet<NaiveDate> {
        self.windows.iter().flat_map(|w| w.range().days()).collect()
    }

    /// Whether the item needs a fetch
    #[inline]
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        self.classification == Classification::Fetch
    }

    /// Check structural invariants
    ///
    /// # Errors
    /// Returns `ModelError::PlanInvariant` describing the first violation.
    pub fn validate(&self) -> Result<(), ModelError> {
        let key = &self.item_key;
        if *key != item_key(self.item_type, &self.object_id, &self.target_id, self.slot_kind()) {
            return Err(ModelError::invariant(key, "item key does not match identity"));
        }
        let is_fetch = self.classification == Classification::Fetch;
        if is_fetch == self.windows.is_empty() {
            return Err(ModelError::invariant(
                key,
                "windows must be non-empty exactly when classification is fetch",
            ));
        }
        if (self.classification == Classification::Unfetchable)
            != self.unfetchable_reason.is_some()
        {
            return Err(ModelError::invariant(
                key,
                "unfetchable reason must accompany unfetchable classification",
            ));
        }
        let mut previous_end: Option<NaiveDate> = None;
        for window in &self.windows {
            if window.start > window.end {
                return Err(ModelError::invariant(key, "inverted window"));
            }
            if window.day_count != window.range().day_count() {
                return Err(ModelError::invariant(key, "window day count mismatch"));
            }
            if previous_end.is_some_and(|end| window.start <= end) {
                return Err(ModelError::invariant(key, "windows overlap or are unsorted"));
            }
            previous_end = Some(window.end);
        }
        Ok(())
    }
}

/// Category of a plan diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Slice isolation degraded to "no coverage"
    SliceResolution,
    /// Dimensional reduction was refused
    MeceRefused,
    /// Coverage was evaluated on an aggregated partition
    MeceAggregated,
    /// Very recent fetch; a refetch would likely be throttled
    Cooldown,
    /// Signed values were excluded by signature isolation
    SignatureFiltered,
}

/// Informational note attached to a plan
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanDiagnostic {
    /// Item the note is about
    pub item_key: String,
    /// Category
    pub kind: DiagnosticKind,
    /// Human-readable detail
    pub message: String,
}

impl PlanDiagnostic {
    /// Create a diagnostic
    #[must_use]
    pub fn new(item_key: impl Into<String>, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            item_key: item_key.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Complete fetch plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchPlan {
    /// Format version
    pub version: u32,
    /// When the plan was built
    pub created_at: DateTime<Utc>,
    /// Reference time used for maturity decisions
    pub reference_now: DateTime<Utc>,
    /// Query DSL the plan answers
    pub dsl: String,
    /// Items, sorted by key
    pub items: Vec<FetchPlanItem>,
    /// Informational notes, excluded from plan equality
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<PlanDiagnostic>,
}

impl FetchPlan {
    /// Build a canonical plan
    #[must_use]
    pub fn new(
        created_at: DateTime<Utc>,
        reference_now: DateTime<Utc>,
        dsl: impl Into<String>,
        items: Vec<FetchPlanItem>,
        diagnostics: Vec<PlanDiagnostic>,
    ) -> Self {
        Self {
            version: PLAN_VERSION,
            created_at,
            reference_now,
            dsl: dsl.into(),
            items,
            diagnostics,
        }
        .canonicalise()
    }

    /// Sort items, windows and diagnostics into canonical order
    #[must_use]
    pub fn canonicalise(mut self) -> Self {
        for item in &mut self.items {
            item.windows.sort();
        }
        self.items.sort_by(|a, b| a.item_key.cmp(&b.item_key));
        self.diagnostics.sort();
        self
    }

    /// Whether the plan is already in canonical order
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        *self == self.clone().canonicalise()
    }

    /// Serialize a canonical copy as JSON
    ///
    /// # Errors
    /// Propagates serialization failures.
    pub fn to_canonical_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(&self.clone().canonicalise())?)
    }

    /// Parse a plan from JSON, canonicalising it
    ///
    /// # Errors
    /// Propagates deserialization failures.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let plan: Self = serde_json::from_str(json)?;
        Ok(plan.canonicalise())
    }

    /// Item by key
    #[must_use]
    pub fn item(&self, key: &str) -> Option<&FetchPlanItem> {
        self.items.iter().find(|i| i.item_key == key)
    }

    /// Items that need fetching
    pub fn fetch_items(&self) -> impl Iterator<Item = &FetchPlanItem> {
        self.items.iter().filter(|i| i.is_fetch())
    }

    /// Check every item's invariants and key uniqueness
    ///
    /// # Errors
    /// Returns the first `ModelError::PlanInvariant` found.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = BTreeSet::new();
        for item in &self.items {
            if !seen.insert(item.item_key.as_str()) {
                return Err(ModelError::invariant(&item.item_key, "duplicate item key"));
            }
            item.validate()?;
        }
        Ok(())
    }

    /// Counts per classification and days per reason
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            total_items: self.items.len(),
            ..PlanSummary::default()
        };
        for item in &self.items {
            match item.classification {
                Classification::Fetch => summary.fetch += 1,
                Classification::Covered => summary.covered += 1,
                Classification::Unfetchable => summary.unfetchable += 1,
            }
            summary.windows += item.windows.len();
            for window in &item.windows {
                *summary.days_by_reason.entry(window.reason).or_insert(0) += window.day_count;
            }
        }
        summary
    }

    /// Human-readable dry-run report
    #[must_use]
    pub fn render_dry_run(&self) -> String {
        let summary = self.summary();
        let mut out = String::new();
        let _ = writeln!(out, "Fetch plan v{} for {}", self.version, self.dsl);
        let _ = writeln!(out, "reference: {}", self.reference_now.to_rfc3339());
        let _ = writeln!(
            out,
            "items: {} (fetch {}, covered {}, unfetchable {})",
            summary.total_items, summary.fetch, summary.covered, summary.unfetchable
        );
        for item in &self.items {
            let _ = write!(
                out,
                "  {:<11} {}",
                item.classification.as_str().to_uppercase(),
                item.item_key
            );
            if let Some(reason) = item.unfetchable_reason {
                let _ = write!(out, " ({})", reason.as_str());
            }
            for window in &item.windows {
                let _ = write!(
                    out,
                    " [{}..{} {} {}d]",
                    window.start,
                    window.end,
                    window.reason.as_str(),
                    window.day_count
                );
            }
            out.push('\n');
        }
        if !self.diagnostics.is_empty() {
            out.push_str("diagnostics:\n");
            for diag in &self.diagnostics {
                let _ = writeln!(out, "  {} {:?}: {}", diag.item_key, diag.kind, diag.message);
            }
        }
        out
    }
}

/// Whether two plans have the same meaning
///
/// Insensitive to item, window and diagnostic order; ignores `created_at`
/// and diagnostics; sensitive to every other field.
#[must_use]
pub fn plans_equal(a: &FetchPlan, b: &FetchPlan) -> bool {
    let a = a.clone().canonicalise();
    let b = b.clone().canonicalise();
    a.version == b.version
        && a.reference_now == b.reference_now
        && a.dsl == b.dsl
        && a.items == b.items
}

/// Aggregate counts for a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Number of items
    pub total_items: usize,
    /// Items classified fetch
    pub fetch: usize,
    /// Items classified covered
    pub covered: usize,
    /// Items classified unfetchable
    pub unfetchable: usize,
    /// Total windows
    pub windows: usize,
    /// Days to fetch per reason
    pub days_by_reason: BTreeMap<WindowReason, u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn window(from: u32, to: u32, reason: WindowReason) -> FetchWindow {
        FetchWindow::new(DateRange::new(d(from), d(to)).unwrap(), reason)
    }

    fn identity(object: &str) -> ItemIdentity {
        ItemIdentity::parameter(object, "edge-1", SlotKind::Base, TemporalMode::Window)
    }

    fn plan(items: Vec<FetchPlanItem>) -> FetchPlan {
        let now = Utc.with_ymd_and_hms(2026, 1, 21, 0, 0, 0).unwrap();
        FetchPlan::new(now, now, "window(1-Jan-26:20-Jan-26)", items, Vec::new())
    }

    #[test]
    fn item_key_format() {
        assert_eq!(
            item_key(ItemType::Parameter, "p1", "e1", Some(SlotKind::Conditional(2))),
            "parameter:p1:e1:conditional_p:2"
        );
        assert_eq!(item_key(ItemType::Case, "c1", "n1", None), "case:c1:n1::");
    }

    #[test]
    fn build_windows_splits_on_reason_and_gap() {
        let mut reasons = BTreeMap::new();
        reasons.insert(d(1), WindowReason::Missing);
        reasons.insert(d(2), WindowReason::Missing);
        reasons.insert(d(3), WindowReason::Stale);
        reasons.insert(d(5), WindowReason::Stale);
        let windows = build_windows(&reasons);
        assert_eq!(
            windows,
            vec![
                window(1, 2, WindowReason::Missing),
                window(3, 3, WindowReason::Stale),
                window(5, 5, WindowReason::Stale),
            ]
        );
    }

    #[test]
    fn fetch_with_no_windows_is_covered() {
        let item = FetchPlanItem::fetch(identity("p1"), Vec::new());
        assert_eq!(item.classification, Classification::Covered);
        assert!(item.validate().is_ok());
    }

    #[test]
    fn validate_catches_overlap() {
        let mut item = FetchPlanItem::fetch(identity("p1"), vec![window(1, 3, WindowReason::Missing)]);
        item.windows.push(window(3, 4, WindowReason::Stale));
        assert!(item.validate().is_err());
    }

    #[test]
    fn canonicalise_is_idempotent() {
        let p = plan(vec![
            FetchPlanItem::fetch(
                identity("zeta"),
                vec![window(5, 6, WindowReason::Stale), window(1, 2, WindowReason::Missing)],
            ),
            FetchPlanItem::covered(identity("alpha")),
        ]);
        let once = p.to_canonical_json().unwrap();
        let twice = FetchPlan::from_json(&once).unwrap().to_canonical_json().unwrap();
        assert_eq!(once, twice);
        assert_eq!(p.items[0].object_id, "alpha");
        assert!(p.is_canonical());
    }

    #[test]
    fn plans_equal_ignores_order_but_not_reason() {
        let a = plan(vec![
            FetchPlanItem::covered(identity("a")),
            FetchPlanItem::fetch(identity("b"), vec![window(1, 2, WindowReason::Missing)]),
        ]);
        let mut b = a.clone();
        b.items.reverse();
        b.diagnostics.push(PlanDiagnostic::new("x", DiagnosticKind::Cooldown, "recent"));
        assert!(plans_equal(&a, &b));

        let mut c = a.clone();
        c.items[1].windows[0].reason = WindowReason::Stale;
        assert!(!plans_equal(&a, &c));
    }

    #[test]
    fn summary_counts_days_by_reason() {
        let p = plan(vec![
            FetchPlanItem::fetch(
                identity("a"),
                vec![window(1, 3, WindowReason::Missing), window(10, 11, WindowReason::Stale)],
            ),
            FetchPlanItem::unfetchable(identity("b"), UnfetchableReason::NoFile),
        ]);
        let summary = p.summary();
        assert_eq!(summary.fetch, 1);
        assert_eq!(summary.unfetchable, 1);
        assert_eq!(summary.windows, 2);
        assert_eq!(summary.days_by_reason.get(&WindowReason::Missing), Some(&3));
        assert_eq!(summary.days_by_reason.get(&WindowReason::Stale), Some(&2));

        let report = p.render_dry_run();
        assert!(report.contains("UNFETCHABLE"));
        assert!(report.contains("(no_file)"));
        assert!(report.contains("missing 3d"));
    }
}
