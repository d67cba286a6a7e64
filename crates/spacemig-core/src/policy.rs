//! Environment policy resolution
//!
//! Turns a target environment name plus optional explicit settings into a
//! fully populated [`EnvironmentPolicy`], and derives the id of the remote
//! environment that backs it.

use crate::config::{ConfigSource, EnvironmentOverride, Settings};
use crate::error::SpaceMigResult;
use crate::types::{EnvironmentId, EnvironmentPolicy};
use chrono::{DateTime, Utc};

/// Resolve the policy for `environment_name` from a config source
///
/// # Errors
/// Returns [`crate::SpaceMigError::ConfigNotFound`] if the source cannot be loaded.
pub fn resolve(source: &ConfigSource, environment_name: &str) -> SpaceMigResult<EnvironmentPolicy> {
    let settings = source.load()?;
    Ok(resolve_with(&settings, environment_name))
}

/// Resolve the policy for `environment_name` from loaded settings
///
/// Rules, in order:
/// 1. An explicit `alias` wins.
/// 2. Without `alias`, an explicit `persistent = true` means not aliased.
/// 3. Otherwise protected names are aliased and everything else is transient.
#[must_use]
pub fn resolve_with(settings: &Settings, environment_name: &str) -> EnvironmentPolicy {
    let explicit = settings
        .environments
        .get(environment_name)
        .copied()
        .unwrap_or_default();
    let protected = settings.is_protected(environment_name);

    let policy = match explicit {
        EnvironmentOverride {
            alias: Some(aliased),
            persistent,
        } => {
            if aliased && persistent == Some(true) {
                tracing::warn!(
                    "{} is configured as both aliased and persistent; aliased environments are always replaced",
                    environment_name
                );
            }
            EnvironmentPolicy::new(environment_name, aliased, persistent.unwrap_or(false))
        }
        EnvironmentOverride {
            alias: None,
            persistent: Some(true),
        } => EnvironmentPolicy::new(environment_name, false, true),
        EnvironmentOverride { alias: None, .. } => {
            EnvironmentPolicy::new(environment_name, protected, false)
        }
    };

    tracing::debug!(
        "Resolved policy for {}: {} (protected: {})",
        environment_name,
        policy.kind(),
        protected
    );
    policy
}

/// Id of the remote environment backing `policy` for a run started at `started_at`
///
/// Aliased policies land on a fresh `{name}-{YYYY-MM-DD}-{HHMM}` environment;
/// everything else uses the name itself.
#[must_use]
pub fn resolve_environment_id(policy: &EnvironmentPolicy, started_at: DateTime<Utc>) -> EnvironmentId {
    if policy.aliased {
        EnvironmentId(format!(
            "{}-{}",
            policy.environment_name,
            started_at.format("%Y-%m-%d-%H%M")
        ))
    } else {
        EnvironmentId(policy.environment_name.clone())
    }
}
