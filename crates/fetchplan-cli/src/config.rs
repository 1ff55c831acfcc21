//! Aggregate configuration file
//!
//! One TOML, YAML or JSON document configures every component:
//!
//! ```toml
//! event_free_connections = ["sheets"]
//!
//! [planner]
//! header_coverage = "require_daily_arrays"
//!
//! [exec]
//! mode = "manual"
//! cooldown = 3660
//!
//! [[contexts]]
//! key = "channel"
//! values = ["google", "meta"]
//! other_policy = "computed"
//! ```

use crate::input::read_structured;
use crate::logging::LoggingConfig;
use anyhow::Context;
use fetchplan_core::{ContextDefinition, PlannerConfig, StaticContextRegistry};
use fetchplan_exec::ExecConfig;
use fetchplan_snapshot::MapperConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Workspace-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchplanConfig {
    /// Connections that do not need event ids
    pub event_free_connections: Vec<String>,
    /// Plan builder settings
    pub planner: PlannerConfig,
    /// Snapshot mapper settings
    pub mapper: MapperConfig,
    /// Execution settings
    pub exec: ExecConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Context dimension definitions
    pub contexts: Vec<ContextDefinition>,
}

impl FetchplanConfig {
    /// Load from a `.toml`, `.yaml`/`.yml` or `.json` file
    ///
    /// # Errors
    /// Fails on unreadable files, unknown extensions, parse errors or an
    /// invalid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config: Self = read_structured(path)
            .with_context(|| format!("loading config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else defaults
    ///
    /// # Errors
    /// See [`FetchplanConfig::load`].
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    /// Check every section
    ///
    /// # Errors
    /// Returns the first invalid section.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.planner.validate().context("invalid [planner] section")?;
        self.exec.validate().context("invalid [exec] section")?;
        if let Some(empty) = self.contexts.iter().find(|c| c.values.is_empty()) {
            anyhow::bail!("context '{}' defines no values", empty.key);
        }
        Ok(())
    }

    /// Registry over the configured context definitions
    #[must_use]
    pub fn registry(&self) -> StaticContextRegistry {
        self.contexts.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fetchplan_core::{HeaderCoveragePolicy, OtherPolicy};
    use fetchplan_exec::ExecMode;
    use std::time::Duration;

    #[test]
    fn toml_sections_override_defaults() {
        let text = r#"
event_free_connections = ["sheets"]

[planner]
header_coverage = "require_daily_arrays"

[exec]
mode = "manual"
cooldown = 120

[[contexts]]
key = "channel"
values = ["google", "meta"]
other_policy = "computed"
"#;
        let config: FetchplanConfig = toml::from_str(text).unwrap();
        assert_eq!(config.planner.header_coverage, HeaderCoveragePolicy::RequireDailyArrays);
        assert_eq!(config.planner.max_mece_dimensions, 4);
        assert_eq!(config.exec.mode, ExecMode::Manual);
        assert_eq!(config.exec.cooldown, Duration::from_secs(120));
        assert_eq!(config.contexts[0].other_policy, OtherPolicy::Computed);
        assert!(config.validate().is_ok());
        assert!(config.registry().definition("channel").is_some());
    }

    #[test]
    fn empty_context_is_rejected() {
        let config = FetchplanConfig {
            contexts: vec![ContextDefinition::new("channel", &[])],
            ..FetchplanConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
