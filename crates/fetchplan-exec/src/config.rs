//! Execution configuration

use crate::error::ExecError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How rate limits are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecMode {
    /// Cool down and restart the interrupted scope
    #[default]
    Automated,
    /// Stop immediately and explain how to resume
    Manual,
}

/// Default cooldown after a rate limit
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(61 * 60);

/// Execution configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Rate-limit handling mode
    pub mode: ExecMode,
    /// Cooldown after a rate limit
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Countdown progress interval during a cooldown
    #[serde(with = "duration_secs")]
    pub cooldown_tick: Duration,
    /// Cooldown restarts allowed per scope
    pub max_scope_restarts: u32,
    /// Extra rate-limit substrings, on top of the built-in ones
    pub rate_limit_patterns: Vec<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            mode: ExecMode::Automated,
            cooldown: DEFAULT_COOLDOWN,
            cooldown_tick: Duration::from_secs(60),
            max_scope_restarts: 3,
            rate_limit_patterns: Vec::new(),
        }
    }
}

impl ExecConfig {
    /// With mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    /// With cooldown duration
    #[inline]
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// With countdown tick
    #[inline]
    #[must_use]
    pub fn with_cooldown_tick(mut self, tick: Duration) -> Self {
        self.cooldown_tick = tick;
        self
    }

    /// With restart cap
    #[inline]
    #[must_use]
    pub fn with_max_scope_restarts(mut self, restarts: u32) -> Self {
        self.max_scope_restarts = restarts;
        self
    }

    /// With an extra rate-limit pattern
    #[must_use]
    pub fn with_rate_limit_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rate_limit_patterns.push(pattern.into());
        self
    }

    /// Check the configuration
    ///
    /// # Errors
    /// Returns `ExecError::InvalidConfig` for a zero tick or a blank pattern.
    pub fn validate(&self) -> Result<(), ExecError> {
        if self.cooldown_tick.is_zero() {
            return Err(ExecError::InvalidConfig("cooldown_tick must be positive".into()));
        }
        if self.rate_limit_patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(ExecError::InvalidConfig("rate_limit_patterns contains a blank entry".into()));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ExecConfig::default();
        assert_eq!(config.cooldown, Duration::from_secs(3660));
        assert_eq!(config.max_scope_restarts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cooldown_serializes_as_seconds() {
        let config = ExecConfig::default().with_cooldown(Duration::from_secs(90));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cooldown"], 90);
        let back: ExecConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn blank_pattern_rejected() {
        let config = ExecConfig::default().with_rate_limit_pattern("  ");
        assert!(matches!(config.validate(), Err(ExecError::InvalidConfig(_))));
    }
}
