//! Execution sink: the component that actually fetches and writes

use crate::error::SinkError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fetchplan_model::{FetchPlanItem, FetchWindow};

/// One item to execute
///
/// The sink must fetch exactly `windows`; it never re-plans.
#[derive(Debug, Clone, Copy)]
pub struct ItemExecution<'a> {
    /// Plan item
    pub item: &'a FetchPlanItem,
    /// Windows to fetch, possibly widened beyond the plan
    pub windows: &'a [FetchWindow],
    /// Retrieval timestamp shared by the whole scope
    pub retrieved_at: DateTime<Utc>,
    /// Ignore any cached response
    pub bust_cache: bool,
}

impl ItemExecution<'_> {
    /// Days across all windows
    #[must_use]
    pub fn total_days(&self) -> u32 {
        self.windows.iter().map(|w| w.day_count).sum()
    }
}

/// Result of one successful execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkOutcome {
    /// The sink served the request without fetching
    pub cache_hit: bool,
    /// Days fetched from the source
    pub days_fetched: u32,
}

/// Performs the real fetch and write for one item
#[async_trait]
pub trait ExecutionSink: Send + Sync {
    /// Execute `request`
    async fn execute(&self, request: ItemExecution<'_>) -> Result<SinkOutcome, SinkError>;
}
