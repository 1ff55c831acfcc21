//! Synchronous progress notifications

use crate::scope::ScopeKey;
use std::time::Duration;

/// Progress event emitted between item executions and around cooldowns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// An item is about to execute
    ItemStarted {
        /// Item key
        item_key: String,
        /// 1-based position among fetch items
        index: usize,
        /// Fetch items in the run
        total: usize,
    },
    /// An item finished successfully
    ItemSucceeded {
        /// Item key
        item_key: String,
        /// Days fetched
        days_fetched: u32,
    },
    /// An item failed and was skipped
    ItemFailed {
        /// Item key
        item_key: String,
        /// Error text
        message: String,
    },
    /// A rate-limit cooldown began
    CooldownStarted {
        /// Cooldown length
        duration: Duration,
    },
    /// Countdown tick
    CooldownTick {
        /// Time left
        remaining: Duration,
    },
    /// The cooldown finished
    CooldownFinished,
    /// A scope restarts from its first item
    ScopeRestarted {
        /// Scope
        scope: ScopeKey,
        /// Restart number, starting at 1
        attempt: u32,
    },
}

/// Receives progress events
#[cfg_attr(test, mockall::automock)]
pub trait ProgressSink: Send + Sync {
    /// Handle one event
    fn notify(&self, event: &ProgressEvent);
}

/// Progress sink that discards events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _event: &ProgressEvent) {}
}
