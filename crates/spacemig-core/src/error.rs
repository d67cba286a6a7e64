//! Error types for spacemig
//!
//! Provides error handling for:
//! - Config loading failures
//! - Provisioning refusals, failures and timeouts
//! - Migration step and ledger failures
//! - Downgraded (non-fatal) credential and alias problems

use crate::client::{ClientError, StepError};
use crate::types::{EnvironmentId, MigrationId};
use std::path::PathBuf;

/// Main spacemig error type
#[derive(Debug, thiserror::Error)]
pub enum SpaceMigError {
    /// Config source could not be read or parsed
    #[error("config not found at {path}: {reason}")]
    ConfigNotFound {
        /// Config file path
        path: PathBuf,
        /// Why loading failed
        reason: String,
    },

    /// Aliased environment already exists; never clobbered
    #[error("environment {environment_id} already exists, refusing to overwrite it")]
    ProvisionConflict { environment_id: EnvironmentId },

    /// Environment did not become ready within the poll bound
    #[error("environment {environment_id} not ready after {attempts} status checks")]
    ProvisionTimeout {
        environment_id: EnvironmentId,
        attempts: u32,
    },

    /// Remote reported a terminal failure while processing the environment
    #[error("environment {environment_id} processing failed")]
    ProvisionFailed { environment_id: EnvironmentId },

    /// Some API keys could not be granted the environment
    #[error("failed to grant {environment_id} to api keys: {}", failed_keys.join(", "))]
    CredentialPropagationPartialFailure {
        environment_id: EnvironmentId,
        failed_keys: Vec<String>,
    },

    /// Migration files could not be listed
    #[error("cannot read migrations from {dir}: {source}")]
    MigrationDiscovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Environment has no default locale for ledger fields
    #[error("environment {environment_id} has no default locale")]
    NoDefaultLocale { environment_id: EnvironmentId },

    /// A migration step or its ledger record failed
    #[error("migration {id} failed: {cause}")]
    MigrationStepFailed { id: MigrationId, cause: StepFailure },

    /// Alias could not be repointed; migrations stay applied
    #[error("alias {alias} could not be pointed at {target}: {cause}")]
    AliasUpdateFailed {
        alias: String,
        target: EnvironmentId,
        #[source]
        cause: ClientError,
    },

    /// Remote call failed outside a phase with its own classification
    #[error("remote error: {0}")]
    Remote(#[from] ClientError),
}

impl SpaceMigError {
    /// Whether the error stops the run
    ///
    /// Credential and alias problems are recoverable operationally without
    /// re-running migrations, so they are reported but do not abort.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::CredentialPropagationPartialFailure { .. } | Self::AliasUpdateFailed { .. }
        )
    }

    /// Create config error for path
    pub fn config_not_found(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Stage of a migration step that failed
#[derive(Debug, thiserror::Error)]
pub enum StepFailure {
    /// The migration itself failed
    #[error("execution failed: {0}")]
    Execution(#[from] StepError),

    /// Ledger entry could not be created
    #[error("ledger entry not created: {0}")]
    LedgerCreate(#[source] ClientError),

    /// Ledger entry was created but not published
    #[error("ledger entry not published: {0}")]
    LedgerPublish(#[source] ClientError),
}

/// Result type alias for spacemig operations
pub type SpaceMigResult<T> = Result<T, SpaceMigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SpaceMigError::ProvisionConflict {
            environment_id: "staging-2024-01-01-1200".into(),
        };
        assert!(err.to_string().contains("already exists"));

        let err = SpaceMigError::CredentialPropagationPartialFailure {
            environment_id: "feat".into(),
            failed_keys: vec!["k1".into(), "k2".into()],
        };
        assert!(err.to_string().ends_with("k1, k2"));
    }

    #[test]
    fn fatal_classification() {
        assert!(SpaceMigError::ProvisionFailed {
            environment_id: "x".into()
        }
        .is_fatal());
        assert!(SpaceMigError::ProvisionTimeout {
            environment_id: "x".into(),
            attempts: 10
        }
        .is_fatal());
        assert!(!SpaceMigError::AliasUpdateFailed {
            alias: "master".into(),
            target: "master-2024-01-01-1200".into(),
            cause: ClientError::NotFound("alias master".into()),
        }
        .is_fatal());
        assert!(!SpaceMigError::CredentialPropagationPartialFailure {
            environment_id: "x".into(),
            failed_keys: vec![],
        }
        .is_fatal());
    }

    #[test]
    fn step_failure_names_stage() {
        let err = SpaceMigError::MigrationStepFailed {
            id: "1.0.1".parse().unwrap(),
            cause: StepFailure::LedgerPublish(ClientError::Api {
                status: 409,
                message: "VersionMismatch".into(),
            }),
        };
        let text = err.to_string();
        assert!(text.contains("1.0.1"));
        assert!(text.contains("not published"));
    }

    #[test]
    fn config_error_is_fatal() {
        let err = SpaceMigError::config_not_found("spacemig.toml", "missing");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("spacemig.toml"));
    }
}
