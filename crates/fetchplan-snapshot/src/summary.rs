//! Snapshot store retrieval summary

use crate::error::SnapshotError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Retrieval summary query
///
/// An empty `slice_keys` asks for every slice key stored for the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryQuery {
    /// Workspace-qualified parameter id
    pub param_id: String,
    /// Core hash
    pub core_hash: String,
    /// Slice keys to restrict to
    pub slice_keys: Vec<String>,
    /// Anchor range start
    pub anchor_from: NaiveDate,
    /// Anchor range end
    pub anchor_to: NaiveDate,
    /// First retrieval day of interest
    pub sweep_from: NaiveDate,
    /// Last retrieval day of interest
    pub sweep_to: NaiveDate,
}

/// One stored retrieval of one slice key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalRow {
    /// When the retrieval ran
    pub retrieved_at: DateTime<Utc>,
    /// Slice key written by the retrieval
    pub slice_key: String,
}

impl RetrievalRow {
    /// Create a row
    #[must_use]
    pub fn new(retrieved_at: DateTime<Utc>, slice_key: impl Into<String>) -> Self {
        Self {
            retrieved_at,
            slice_key: slice_key.into(),
        }
    }
}

/// Read-only retrieval summary API of the snapshot store
#[async_trait]
pub trait SnapshotSummaryApi: Send + Sync {
    /// Retrievals matching `query`
    async fn query(&self, query: &SummaryQuery) -> Result<Vec<RetrievalRow>, SnapshotError>;
}
