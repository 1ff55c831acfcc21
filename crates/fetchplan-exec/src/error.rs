//! Error types for plan execution

use fetchplan_model::ModelError;

/// Failure reported by an execution sink or coverage probe
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The external source rejected or failed the request
    #[error("provider error: {message}")]
    Provider {
        /// Provider message, matched against rate-limit patterns
        message: String,
        /// HTTP-like status, when the provider reports one
        status: Option<u16>,
    },

    /// Writing fetched data back to the cache failed
    #[error("write failed: {0}")]
    Write(String),

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

impl SinkError {
    /// Provider failure with a message
    #[inline]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            status: None,
        }
    }

    /// Provider failure with a status code
    #[inline]
    pub fn provider_status(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Text inspected by rate-limit detection
    #[must_use]
    pub fn detection_text(&self) -> String {
        match self {
            Self::Provider {
                message,
                status: Some(status),
            } => format!("{status} {message}"),
            other => other.to_string(),
        }
    }

    /// Whether the default rate-limit patterns match this error
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        crate::rate_limit::RateLimitDetector::default().is_rate_limit(self)
    }

    /// Whether a later attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => status.map_or(true, |s| s == 429 || s >= 500),
            Self::Write(_) => false,
            Self::Other(_) => true,
        }
    }
}

/// Run-level execution error
///
/// Per-item failures never surface here; they are counted in the run report.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// A scope hit the rate limit more often than allowed
    #[error("scope {scope} restarted {restarts} times without completing")]
    RestartLimitExceeded {
        /// Scope description
        scope: String,
        /// Restarts performed
        restarts: u32,
    },

    /// Execution configuration is unusable
    #[error("invalid exec config: {0}")]
    InvalidConfig(String),

    /// Plan failed validation
    #[error(transparent)]
    Plan(#[from] ModelError),
}
