//! Per-slot maturity model

use serde::{Deserialize, Serialize};

/// Latency (maturity) configuration for one parameter slot
///
/// `t95` is the number of days after which roughly 95% of delayed conversions
/// have landed. `path_t95` is the cumulative horizon from the cohort anchor to
/// this edge and, when present, governs cohort-mode maturity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyConfig {
    /// Days until ~95% of conversions have landed
    pub t95: f64,
    /// Days before conversions begin to land
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset_delta_days: Option<f64>,
    /// Anchor-to-edge cumulative t95
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_t95: Option<f64>,
}

impl LatencyConfig {
    /// Create with a plain t95
    #[inline]
    #[must_use]
    pub fn new(t95: f64) -> Self {
        Self {
            t95,
            onset_delta_days: None,
            path_t95: None,
        }
    }

    /// With onset delay
    #[inline]
    #[must_use]
    pub fn with_onset(mut self, days: f64) -> Self {
        self.onset_delta_days = Some(days);
        self
    }

    /// With anchor-to-edge horizon
    #[inline]
    #[must_use]
    pub fn with_path_t95(mut self, days: f64) -> Self {
        self.path_t95 = Some(days);
        self
    }

    /// Whether the config describes a usable horizon
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.t95.is_finite() && self.t95 >= 0.0
    }

    /// Whole-day window-mode horizon, `ceil(t95)`
    #[must_use]
    pub fn window_horizon_days(&self) -> i64 {
        // t95 is a small, non-negative day count
        #[allow(clippy::cast_possible_truncation)]
        let days = self.t95.max(0.0).ceil() as i64;
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_horizon_rounds_up() {
        assert_eq!(LatencyConfig::new(7.0).window_horizon_days(), 7);
        assert_eq!(LatencyConfig::new(6.2).window_horizon_days(), 7);
        assert_eq!(LatencyConfig::new(0.0).window_horizon_days(), 0);
    }

    #[test]
    fn builders_and_validity() {
        let cfg = LatencyConfig::new(5.0).with_onset(1.0).with_path_t95(12.0);
        assert_eq!(cfg.onset_delta_days, Some(1.0));
        assert_eq!(cfg.path_t95, Some(12.0));
        assert!(cfg.is_valid());
        assert!(!LatencyConfig::new(f64::NAN).is_valid());
    }
}
