//! API key propagation
//!
//! Grants every API key of the space read access to a new environment. Keys
//! are updated concurrently and independently; failures are collected, never
//! propagated, since a missing grant can be fixed without re-running migrations.

use crate::client::{ClientError, ResourceClient};
use crate::error::SpaceMigError;
use crate::types::{ApiKey, EnvironmentId};
use futures::future::join_all;

/// Key that could not be updated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFailure {
    pub key_id: String,
    pub error: ClientError,
}

/// Outcome of propagating an environment to all API keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Keys that were granted the environment
    pub updated: Vec<String>,
    /// Keys that already had the grant
    pub unchanged: Vec<String>,
    /// Keys whose update failed
    pub failed: Vec<KeyFailure>,
    /// Set when the keys could not even be listed
    pub listing_error: Option<ClientError>,
}

impl PropagationReport {
    /// Whether every key ended up with the grant
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.listing_error.is_none()
    }

    /// The partial failure as a non-fatal error, if any key failed
    #[must_use]
    pub fn warning(&self, environment_id: &EnvironmentId) -> Option<SpaceMigError> {
        if self.is_complete() {
            return None;
        }
        let mut failed_keys: Vec<String> = self.failed.iter().map(|f| f.key_id.clone()).collect();
        if self.listing_error.is_some() {
            failed_keys.push("<listing>".to_string());
        }
        Some(SpaceMigError::CredentialPropagationPartialFailure {
            environment_id: environment_id.clone(),
            failed_keys,
        })
    }
}

enum KeyOutcome {
    Updated(String),
    Unchanged(String),
    Failed(KeyFailure),
}

/// Grant `environment_id` to every API key of the space
///
/// Completes once every key update has settled.
pub async fn propagate(
    client: &dyn ResourceClient,
    environment_id: &EnvironmentId,
) -> PropagationReport {
    tracing::info!("Update API keys to allow access to new environment");

    let keys = match client.list_api_keys().await {
        Ok(keys) => keys,
        Err(error) => {
            tracing::warn!("Could not list API keys: {}", error);
            return PropagationReport {
                listing_error: Some(error),
                ..PropagationReport::default()
            };
        }
    };

    let outcomes = join_all(keys.into_iter().map(|key| grant(client, key, environment_id))).await;

    let mut report = PropagationReport::default();
    for outcome in outcomes {
        match outcome {
            KeyOutcome::Updated(id) => report.updated.push(id),
            KeyOutcome::Unchanged(id) => report.unchanged.push(id),
            KeyOutcome::Failed(failure) => {
                tracing::warn!("Failed to update API key {}: {}", failure.key_id, failure.error);
                report.failed.push(failure);
            }
        }
    }

    tracing::info!(
        "API keys: {} updated, {} already granted, {} failed",
        report.updated.len(),
        report.unchanged.len(),
        report.failed.len()
    );
    report
}

async fn grant(
    client: &dyn ResourceClient,
    mut key: ApiKey,
    environment_id: &EnvironmentId,
) -> KeyOutcome {
    if key.grants(environment_id) {
        tracing::debug!("API key {} already grants {}", key.id, environment_id);
        return KeyOutcome::Unchanged(key.id);
    }

    tracing::info!("Updating - {}", key.id);
    key.environments.push(environment_id.to_string());
    match client.update_api_key(&key).await {
        Ok(()) => KeyOutcome::Updated(key.id),
        Err(error) => KeyOutcome::Failed(KeyFailure {
            key_id: key.id,
            error,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockResourceClient;

    fn key(id: &str, environments: &[&str]) -> ApiKey {
        ApiKey {
            id: id.to_string(),
            name: format!("{id} key"),
            description: Some(format!("Delivery key {id}")),
            version: 1,
            environments: environments.iter().map(ToString::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn grants_every_key() {
        let mut client = MockResourceClient::new();
        client
            .expect_list_api_keys()
            .returning(|| Ok(vec![key("k1", &["master"]), key("k2", &[])]));
        client
            .expect_update_api_key()
            .times(2)
            .withf(|key| {
                key.environments.last().map(String::as_str) == Some("feature-x")
                    && key.description == Some(format!("Delivery key {}", key.id))
            })
            .returning(|_| Ok(()));

        let report = propagate(&client, &"feature-x".into()).await;

        assert!(report.is_complete());
        assert_eq!(report.updated.len(), 2);
        assert!(report.warning(&"feature-x".into()).is_none());
    }

    #[tokio::test]
    async fn already_granted_key_is_left_alone() {
        let mut client = MockResourceClient::new();
        client
            .expect_list_api_keys()
            .returning(|| Ok(vec![key("k1", &["master", "qa"])]));
        client.expect_update_api_key().never();

        let report = propagate(&client, &"qa".into()).await;
        assert_eq!(report.unchanged, vec!["k1".to_string()]);
        assert!(report.updated.is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let mut client = MockResourceClient::new();
        client
            .expect_list_api_keys()
            .returning(|| Ok(vec![key("k1", &[]), key("k2", &[]), key("k3", &[])]));
        client.expect_update_api_key().times(3).returning(|key| {
            if key.id == "k2" {
                Err(ClientError::Api {
                    status: 409,
                    message: "VersionMismatch".into(),
                })
            } else {
                Ok(())
            }
        });

        let environment_id = EnvironmentId::from("feature-x");
        let report = propagate(&client, &environment_id).await;

        assert_eq!(report.updated.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key_id, "k2");

        let warning = report.warning(&environment_id).unwrap();
        assert!(!warning.is_fatal());
        assert!(warning.to_string().contains("k2"));
    }

    #[tokio::test]
    async fn listing_failure_is_reported() {
        let mut client = MockResourceClient::new();
        client
            .expect_list_api_keys()
            .returning(|| Err(ClientError::Transport("timeout".into())));
        client.expect_update_api_key().never();

        let report = propagate(&client, &"feature-x".into()).await;
        assert!(!report.is_complete());
        assert!(report.listing_error.is_some());
    }
}
