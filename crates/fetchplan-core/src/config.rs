//! Planner configuration

use crate::error::PlanError;
use serde::{Deserialize, Serialize};

/// How aggregate headers are trusted during coverage checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderCoveragePolicy {
    /// A slice whose envelope contains the request and carries `mean`/`n`
    /// covers the request, even if its daily arrays are sparse
    #[default]
    TrustAggregateHeader,
    /// Always inspect daily arrays
    RequireDailyArrays,
}

/// Plan builder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Header coverage fast-path policy
    pub header_coverage: HeaderCoveragePolicy,
    /// A slice retrieved this many minutes before reference now gets a
    /// cooldown note
    pub cooldown_note_minutes: i64,
    /// Upper bound on unspecified dimensions in a MECE reduction
    pub max_mece_dimensions: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            header_coverage: HeaderCoveragePolicy::default(),
            cooldown_note_minutes: 5,
            max_mece_dimensions: 4,
        }
    }
}

impl PlannerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With header coverage policy
    #[inline]
    #[must_use]
    pub fn with_header_coverage(mut self, policy: HeaderCoveragePolicy) -> Self {
        self.header_coverage = policy;
        self
    }

    /// With cooldown note window
    #[inline]
    #[must_use]
    pub fn with_cooldown_note_minutes(mut self, minutes: i64) -> Self {
        self.cooldown_note_minutes = minutes;
        self
    }

    /// With MECE dimension bound
    #[inline]
    #[must_use]
    pub fn with_max_mece_dimensions(mut self, dims: usize) -> Self {
        self.max_mece_dimensions = dims;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `PlanError::Config` for negative cooldown windows or a zero
    /// dimension bound.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.cooldown_note_minutes < 0 {
            return Err(PlanError::Config(
                "cooldown_note_minutes must not be negative".into(),
            ));
        }
        if self.max_mece_dimensions == 0 {
            return Err(PlanError::Config(
                "max_mece_dimensions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PlannerConfig::default();
        assert_eq!(cfg.header_coverage, HeaderCoveragePolicy::TrustAggregateHeader);
        assert_eq!(cfg.cooldown_note_minutes, 5);
        assert_eq!(cfg.max_mece_dimensions, 4);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_dimensions() {
        let cfg = PlannerConfig::new().with_max_mece_dimensions(0);
        assert!(matches!(cfg.validate(), Err(PlanError::Config(_))));
    }
}
