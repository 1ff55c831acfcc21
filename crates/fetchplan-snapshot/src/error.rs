//! Error types for snapshot subject mapping

use fetchplan_model::ModelError;

/// Snapshot mapping error
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Hashing service failed
    #[error("hash service failed: {0}")]
    Hash(String),

    /// Retrieval summary query failed
    #[error("retrieval summary unavailable: {message}")]
    Summary {
        /// Provider message
        message: String,
        /// Whether a retry may succeed
        retryable: bool,
    },

    /// Cohort-maturity read without a sweep range
    #[error("cohort maturity read for {item_key} needs a sweep range")]
    MissingSweep {
        /// Item being mapped
        item_key: String,
    },

    /// As-at read without an as-at time
    #[error("as-at read needs an as-at time")]
    MissingAsAt,

    /// Slice family or DSL failed to parse
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl SnapshotError {
    /// Transient summary failure
    #[inline]
    pub fn summary(message: impl Into<String>) -> Self {
        Self::Summary {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether retrying the same request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Summary { retryable, .. } => *retryable,
            Self::Hash(_) => true,
            _ => false,
        }
    }
}
