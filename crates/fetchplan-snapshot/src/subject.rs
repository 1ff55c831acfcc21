//! Snapshot read descriptors

use chrono::{DateTime, NaiveDate, Utc};
use fetchplan_model::{DateRange, FetchPlanItem};
use serde::{Deserialize, Serialize};

/// Slice key marking an epoch with no safe slice selection
pub const EPOCH_GAP_SLICE_KEY: &str = "__epoch_gap__";

/// Kind of snapshot read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Latest stored values
    #[default]
    Raw,
    /// Values as they stood at a point in time
    AsAt,
    /// How cohorts matured across a sweep of retrievals
    CohortMaturity,
}

/// What to read for a whole plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadSpec {
    /// Kind of read
    pub mode: ReadMode,
    /// Anchor range
    pub anchor: DateRange,
    /// Point-in-time, for as-at reads
    pub as_at: Option<DateTime<Utc>>,
    /// Retrieval sweep, for cohort-maturity reads
    pub sweep: Option<DateRange>,
}

impl ReadSpec {
    /// Raw read over `anchor`
    #[inline]
    #[must_use]
    pub fn raw(anchor: DateRange) -> Self {
        Self {
            mode: ReadMode::Raw,
            anchor,
            as_at: None,
            sweep: None,
        }
    }

    /// As-at read over `anchor`
    #[inline]
    #[must_use]
    pub fn as_at(anchor: DateRange, as_at: DateTime<Utc>) -> Self {
        Self {
            mode: ReadMode::AsAt,
            anchor,
            as_at: Some(as_at),
            sweep: None,
        }
    }

    /// Cohort-maturity read over `anchor`, sweeping retrievals in `sweep`
    #[inline]
    #[must_use]
    pub fn cohort_maturity(anchor: DateRange, sweep: DateRange) -> Self {
        Self {
            mode: ReadMode::CohortMaturity,
            anchor,
            as_at: None,
            sweep: Some(sweep),
        }
    }
}

/// Plan item a subject was derived from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTarget {
    /// Item key
    pub item_key: String,
    /// Backing file id
    pub object_id: String,
    /// Edge uuid
    pub target_id: String,
    /// Slot name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    /// Conditional index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_index: Option<usize>,
}

impl From<&FetchPlanItem> for SubjectTarget {
    fn from(item: &FetchPlanItem) -> Self {
        Self {
            item_key: item.item_key.clone(),
            object_id: item.object_id.clone(),
            target_id: item.target_id.clone(),
            slot: item.slot.clone(),
            conditional_index: item.conditional_index,
        }
    }
}

/// Backend-facing read descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSubjectRequest {
    /// Unique id within one mapping (`itemKey` or `itemKey#epochN`)
    pub subject_id: String,
    /// Workspace-qualified parameter id
    pub param_id: String,
    /// Short hash of the canonical signature
    pub core_hash: String,
    /// Kind of read
    pub read_mode: ReadMode,
    /// Anchor range start
    pub anchor_from: NaiveDate,
    /// Anchor range end
    pub anchor_to: NaiveDate,
    /// Point-in-time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_at: Option<DateTime<Utc>>,
    /// Sweep start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_from: Option<NaiveDate>,
    /// Sweep end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep_to: Option<NaiveDate>,
    /// Slice keys to read
    pub slice_keys: Vec<String>,
    /// Provenance
    pub target: SubjectTarget,
}

impl SnapshotSubjectRequest {
    /// Whether this subject marks an epoch gap
    #[must_use]
    pub fn is_gap(&self) -> bool {
        self.slice_keys.iter().any(|k| k == EPOCH_GAP_SLICE_KEY)
    }
}
