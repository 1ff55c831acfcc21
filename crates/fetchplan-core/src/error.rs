//! Error types for plan building
//!
//! Planning itself degrades rather than fails: slice resolution problems
//! become diagnostics and `unfetchable` is an ordinary outcome. Only invalid
//! inputs surface as [`PlanError`].

use fetchplan_model::ModelError;

/// Plan building error
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Query DSL has no temporal clause with a date range
    #[error("query '{dsl}' has no window() or cohort() range")]
    MissingRange {
        /// Offending DSL
        dsl: String,
    },

    /// Query carries a point-in-time clause the planner cannot serve
    #[error("query '{dsl}' is a point-in-time read; plan it through the snapshot mapper")]
    AsAtQuery {
        /// Offending DSL
        dsl: String,
    },

    /// Invalid planner configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Model-level parse or invariant failure
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl PlanError {
    /// Whether the error is caused by the caller's query rather than state
    #[inline]
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRange { .. } | Self::AsAtQuery { .. } | Self::Model(ModelError::DslParse { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_errors_are_classified() {
        let err = PlanError::MissingRange {
            dsl: "context(channel:uk)".into(),
        };
        assert!(err.is_query_error());
        assert!(err.to_string().contains("context(channel:uk)"));
        assert!(!PlanError::Config("bad".into()).is_query_error());
    }

    #[test]
    fn model_errors_convert() {
        let err: PlanError = ModelError::dsl("window(", "unterminated").into();
        assert!(err.is_query_error());
    }
}
