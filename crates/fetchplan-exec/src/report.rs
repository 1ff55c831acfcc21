//! Run reports

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every fetch item was attempted
    Completed,
    /// Abort was requested
    Cancelled,
    /// Manual mode stopped at a rate limit
    RateLimited {
        /// What happened and how to resume
        explanation: String,
    },
}

/// One failed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Item key
    pub item_key: String,
    /// Error text
    pub message: String,
}

/// Summary of one execution run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Run id
    pub run_id: Uuid,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Items executed successfully
    pub items_succeeded: usize,
    /// Items that failed
    pub items_failed: usize,
    /// Covered or unfetchable items not sent to the sink
    pub items_skipped: usize,
    /// Successful executions served from cache
    pub cache_hits: usize,
    /// Days fetched across all items
    pub days_fetched: u64,
    /// Cooldowns entered
    pub cooldowns: u32,
    /// Scope restarts performed
    pub scope_restarts: u32,
    /// Per-item failures
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub(crate) fn new(run_id: Uuid, items_skipped: usize) -> Self {
        Self {
            run_id,
            outcome: RunOutcome::Completed,
            items_succeeded: 0,
            items_failed: 0,
            items_skipped,
            cache_hits: 0,
            days_fetched: 0,
            cooldowns: 0,
            scope_restarts: 0,
            failures: Vec::new(),
        }
    }

    /// Whether every attempted item succeeded and the run finished
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.items_failed == 0
    }
}

/// Tallies of one scope attempt, merged only when the attempt is final
#[derive(Debug, Default)]
pub(crate) struct ScopeTally {
    pub(crate) succeeded: usize,
    pub(crate) cache_hits: usize,
    pub(crate) days_fetched: u64,
    pub(crate) failures: Vec<ItemFailure>,
}

impl ScopeTally {
    pub(crate) fn commit(self, report: &mut RunReport) {
        report.items_succeeded += self.succeeded;
        report.cache_hits += self.cache_hits;
        report.days_fetched += self.days_fetched;
        report.items_failed += self.failures.len();
        report.failures.extend(self.failures);
    }
}
