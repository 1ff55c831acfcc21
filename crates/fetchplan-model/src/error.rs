//! Error types for the fetch plan model
//!
//! Covers:
//! - Date and slice DSL parsing failures
//! - Cache slice invariant violations
//! - Plan invariant violations
//! - Serialization failures

use chrono::NaiveDate;

/// Main model error type
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Date string in neither `d-MMM-yy` nor ISO form
    #[error("invalid date: '{0}'")]
    InvalidDate(String),

    /// Range whose start falls after its end
    #[error("inverted date range: {start} is after {end}")]
    InvertedRange {
        /// Range start
        start: NaiveDate,
        /// Range end
        end: NaiveDate,
    },

    /// Slice DSL could not be parsed
    #[error("slice DSL parse error in '{input}': {message}")]
    DslParse {
        /// Offending input
        input: String,
        /// What went wrong
        message: String,
    },

    /// `dates`, `n_daily` and `k_daily` lengths differ
    #[error("daily arrays misaligned: dates={dates}, n_daily={n_daily}, k_daily={k_daily}")]
    MisalignedArrays {
        /// Length of `dates`
        dates: usize,
        /// Length of `n_daily`
        n_daily: usize,
        /// Length of `k_daily`
        k_daily: usize,
    },

    /// Header envelope disagrees with the range in `sliceDSL`
    #[error("envelope mismatch for '{slice_dsl}': header {header}, dsl {dsl}")]
    EnvelopeMismatch {
        /// The slice DSL of the value
        slice_dsl: String,
        /// Header envelope as rendered text
        header: String,
        /// DSL range as rendered text
        dsl: String,
    },

    /// Daily date outside the slice's header envelope
    #[error("date {date} in '{slice_dsl}' lies outside its envelope")]
    DateOutsideEnvelope {
        /// The slice DSL of the value
        slice_dsl: String,
        /// First offending date
        date: NaiveDate,
    },

    /// Plan item breaks a structural invariant
    #[error("plan invariant violated for {item_key}: {message}")]
    PlanInvariant {
        /// Item key of the offending item
        item_key: String,
        /// Description of the violation
        message: String,
    },

    /// JSON (de)serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Create a DSL parse error
    #[inline]
    pub fn dsl(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DslParse {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create a plan invariant error
    #[inline]
    pub fn invariant(item_key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PlanInvariant {
            item_key: item_key.into(),
            message: message.into(),
        }
    }
}
