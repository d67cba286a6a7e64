//! Immutable per-run context
//!
//! Built once before any phase runs and passed by reference into each one.

use crate::client::StepTarget;
use crate::config::Settings;
use crate::types::EnvironmentId;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Everything a run needs besides its collaborators
#[derive(Clone)]
pub struct RunContext {
    /// Space owning the environments
    pub space_id: String,
    /// Target environment name as given by the caller
    pub environment_name: String,
    /// Management token handed to the step executor
    pub access_token: String,
    /// Directory holding migration files
    pub migrations_dir: PathBuf,
    /// Run start time; fixes the aliased environment id
    pub started_at: DateTime<Utc>,
    /// Loaded settings
    pub settings: Settings,
}

impl RunContext {
    /// Create a context starting now with default settings
    #[must_use]
    pub fn new(
        space_id: impl Into<String>,
        environment_name: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            space_id: space_id.into(),
            environment_name: environment_name.into(),
            access_token: access_token.into(),
            migrations_dir: PathBuf::from("migrations"),
            started_at: Utc::now(),
            settings: Settings::default(),
        }
    }

    /// With migrations directory
    #[inline]
    #[must_use]
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// With start time
    #[inline]
    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// With settings
    #[inline]
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Step target for an environment of this space
    #[must_use]
    pub fn step_target(&self, environment_id: &EnvironmentId) -> StepTarget {
        StepTarget {
            space_id: self.space_id.clone(),
            environment_id: environment_id.clone(),
            access_token: self.access_token.clone(),
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("space_id", &self.space_id)
            .field("environment_name", &self.environment_name)
            .field("access_token", &"<redacted>")
            .field("migrations_dir", &self.migrations_dir)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_target_carries_run_identity() {
        let ctx = RunContext::new("space", "feature", "token").with_migrations_dir("db/migrations");
        let target = ctx.step_target(&"feature".into());

        assert_eq!(target.space_id, "space");
        assert_eq!(target.environment_id.as_str(), "feature");
        assert_eq!(target.access_token, "token");
        assert_eq!(ctx.migrations_dir, PathBuf::from("db/migrations"));
        let debug = format!("{ctx:?}");
        assert!(!debug.contains("\"token\""));
        assert!(debug.contains("<redacted>"));
    }
}
