//! Environment provisioning
//!
//! Runs the create / reuse / destroy state machine for a policy and then
//! waits, with a hard attempt cap, for the remote environment to become ready.

use crate::client::ResourceClient;
use crate::config::ProvisioningSettings;
use crate::error::{SpaceMigError, SpaceMigResult};
use crate::types::{Environment, EnvironmentHandle, EnvironmentId, EnvironmentPolicy, EnvironmentStatus, PolicyKind};
use serde::{Deserialize, Serialize};

/// What provisioning does with the remote environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionAction {
    /// Create a new environment
    Create,
    /// Use the existing environment unchanged
    Reuse,
    /// Delete the existing environment, then create a new one
    Recreate,
    /// Refuse to touch an existing environment
    Refuse,
}

/// Decide the action for a policy kind given whether the environment exists
#[must_use]
pub fn plan(kind: PolicyKind, exists: bool) -> ProvisionAction {
    match (kind, exists) {
        (_, false) => ProvisionAction::Create,
        (PolicyKind::Aliased, true) => ProvisionAction::Refuse,
        (PolicyKind::Persistent, true) => ProvisionAction::Reuse,
        (PolicyKind::Transient, true) => ProvisionAction::Recreate,
    }
}

/// Prepares environments against a [`ResourceClient`]
pub struct EnvironmentProvisioner<'a> {
    client: &'a dyn ResourceClient,
    settings: ProvisioningSettings,
}

impl<'a> EnvironmentProvisioner<'a> {
    /// Create a provisioner
    #[inline]
    #[must_use]
    pub fn new(client: &'a dyn ResourceClient, settings: ProvisioningSettings) -> Self {
        Self { client, settings }
    }

    /// Create, reuse or recreate the environment `id` for `policy` and wait until it is ready
    ///
    /// # Errors
    /// - `ProvisionConflict` if an aliased environment already exists
    /// - `ProvisionFailed` if the remote reports a failed environment
    /// - `ProvisionTimeout` if readiness is not reached within the attempt cap
    /// - `Remote` for any other remote failure
    pub async fn prepare(
        &self,
        id: &EnvironmentId,
        policy: &EnvironmentPolicy,
    ) -> SpaceMigResult<EnvironmentHandle> {
        tracing::info!("Checking for existing versions of environment: {}", id);
        let existing = self.client.get_environment(id).await?;
        let action = plan(policy.kind(), existing.is_some());
        tracing::debug!("Provision plan for {} ({}): {:?}", id, policy.kind(), action);

        let environment = match (action, existing) {
            (ProvisionAction::Refuse, _) => {
                tracing::error!("Environment {} already exists; it is never overwritten", id);
                return Err(SpaceMigError::ProvisionConflict {
                    environment_id: id.clone(),
                });
            }
            (ProvisionAction::Reuse, Some(environment)) => {
                tracing::info!("Reusing environment {}", id);
                environment
            }
            (ProvisionAction::Recreate, Some(environment)) => {
                self.client.delete_environment(&environment).await?;
                tracing::info!("Environment {} deleted", id);
                self.create(id).await?
            }
            _ => {
                tracing::info!("Environment {} not found", id);
                self.create(id).await?
            }
        };

        self.wait_until_ready(id).await?;

        Ok(EnvironmentHandle {
            id: id.clone(),
            policy: policy.clone(),
            environment: Environment {
                status: EnvironmentStatus::Ready,
                ..environment
            },
            action,
        })
    }

    async fn create(&self, id: &EnvironmentId) -> SpaceMigResult<Environment> {
        tracing::info!("Creating environment {}", id);
        Ok(self.client.create_environment(id, id.as_str()).await?)
    }

    /// Poll the environment status until it is ready
    ///
    /// # Errors
    /// `ProvisionFailed` on a failed status, `ProvisionTimeout` once the cap is reached.
    pub async fn wait_until_ready(&self, id: &EnvironmentId) -> SpaceMigResult<()> {
        let max_attempts = self.settings.max_attempts;
        tracing::info!("Waiting for environment processing...");

        for attempt in 1..=max_attempts {
            match self.client.get_environment_status(id).await? {
                EnvironmentStatus::Ready => {
                    tracing::info!("Successfully processed environment {} after {} checks", id, attempt);
                    return Ok(());
                }
                EnvironmentStatus::Failed => {
                    tracing::error!("Environment {} processing failed", id);
                    return Err(SpaceMigError::ProvisionFailed {
                        environment_id: id.clone(),
                    });
                }
                EnvironmentStatus::Processing => {
                    tracing::debug!("Environment {} still processing ({}/{})", id, attempt, max_attempts);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.poll_interval()).await;
            }
        }

        tracing::error!("Environment {} preparation timed out", id);
        Err(SpaceMigError::ProvisionTimeout {
            environment_id: id.clone(),
            attempts: max_attempts,
        })
    }
}
