//! Mapper configuration

use serde::{Deserialize, Serialize};

/// Repository and branch that qualify parameter ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRef {
    /// Repository name
    pub repo: String,
    /// Branch name
    pub branch: String,
}

impl Default for WorkspaceRef {
    fn default() -> Self {
        Self {
            repo: "default".to_string(),
            branch: "main".to_string(),
        }
    }
}

impl WorkspaceRef {
    /// Create a workspace reference
    #[must_use]
    pub fn new(repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// Workspace-qualified parameter id: `repo-branch-objectId`
    #[must_use]
    pub fn param_id(&self, object_id: &str) -> String {
        format!("{}-{}-{object_id}", self.repo, self.branch)
    }
}

/// How an uncontexted slice is keyed in the snapshot store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UncontextedSliceKeyPolicy {
    /// The empty key `''`
    #[default]
    Empty,
    /// The bare mode clause, `window()` or `cohort()`
    ModeClause,
}

/// Subject mapper configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Workspace qualifying parameter ids
    pub workspace: WorkspaceRef,
    /// Uncontexted slice key convention
    pub uncontexted_key_policy: UncontextedSliceKeyPolicy,
    /// Upper bound on unspecified dimensions in epoch selection
    pub max_mece_dimensions: Option<usize>,
}

impl MapperConfig {
    /// With workspace
    #[inline]
    #[must_use]
    pub fn with_workspace(mut self, workspace: WorkspaceRef) -> Self {
        self.workspace = workspace;
        self
    }

    /// With uncontexted key policy
    #[inline]
    #[must_use]
    pub fn with_uncontexted_key_policy(mut self, policy: UncontextedSliceKeyPolicy) -> Self {
        self.uncontexted_key_policy = policy;
        self
    }

    pub(crate) fn mece_bound(&self) -> usize {
        self.max_mece_dimensions.unwrap_or(4)
    }
}
