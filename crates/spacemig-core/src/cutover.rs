//! Alias cutover
//!
//! Repoints an alias at the freshly migrated environment. Runs once per
//! aliased run, after every pending migration is recorded.

use crate::client::ResourceClient;
use crate::error::SpaceMigError;
use crate::types::EnvironmentHandle;

/// What the cutover did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CutoverOutcome {
    /// Policy is not aliased; nothing to do
    NotAliased,
    /// Alias already served the environment
    AlreadyCurrent,
    /// Alias moved from `previous` to the new environment
    Updated { previous: String },
}

/// Point the alias named by the handle's policy at the handle's environment
///
/// # Errors
/// Returns [`SpaceMigError::AliasUpdateFailed`] if the alias cannot be read or written.
/// The error is non-fatal: migrations are already committed.
pub async fn cutover(
    client: &dyn ResourceClient,
    handle: &EnvironmentHandle,
) -> Result<CutoverOutcome, SpaceMigError> {
    if !handle.policy.aliased {
        tracing::info!("Environment {} is not aliased, skipping alias update", handle.id);
        return Ok(CutoverOutcome::NotAliased);
    }

    let alias_name = &handle.policy.environment_name;
    let failed = |cause| SpaceMigError::AliasUpdateFailed {
        alias: alias_name.clone(),
        target: handle.id.clone(),
        cause,
    };

    tracing::info!("Update {} alias", alias_name);
    let mut alias = client
        .get_environment_alias(alias_name)
        .await
        .map_err(failed)?;

    if alias.target_environment_id == handle.id.as_str() {
        tracing::info!("Alias {} already points at {}", alias_name, handle.id);
        return Ok(CutoverOutcome::AlreadyCurrent);
    }

    let previous = std::mem::replace(&mut alias.target_environment_id, handle.id.to_string());
    client.update_alias(&alias).await.map_err(failed)?;

    tracing::info!("Alias {} updated: {} -> {}", alias_name, previous, handle.id);
    Ok(CutoverOutcome::Updated { previous })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, MockResourceClient};
    use crate::provision::ProvisionAction;
    use crate::types::{AliasRecord, Environment, EnvironmentPolicy, EnvironmentStatus};

    fn handle(name: &str, id: &str, aliased: bool) -> EnvironmentHandle {
        EnvironmentHandle {
            id: id.into(),
            policy: EnvironmentPolicy::new(name, aliased, false),
            environment: Environment {
                id: id.into(),
                name: id.into(),
                status: EnvironmentStatus::Ready,
            },
            action: ProvisionAction::Create,
        }
    }

    fn alias(target: &str) -> AliasRecord {
        AliasRecord {
            name: "staging".into(),
            target_environment_id: target.into(),
            version: 4,
        }
    }

    #[tokio::test]
    async fn not_aliased_touches_nothing() {
        let mut client = MockResourceClient::new();
        client.expect_get_environment_alias().never();
        client.expect_update_alias().never();

        let outcome = cutover(&client, &handle("feature-x", "feature-x", false)).await.unwrap();
        assert_eq!(outcome, CutoverOutcome::NotAliased);
    }

    #[tokio::test]
    async fn alias_is_repointed_with_version() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_environment_alias()
            .withf(|name| name == "staging")
            .returning(|_| Ok(alias("staging-2023-12-01-0900")));
        client
            .expect_update_alias()
            .times(1)
            .withf(|a| a.target_environment_id == "staging-2024-01-01-1200" && a.version == 4)
            .returning(|_| Ok(()));

        let outcome = cutover(&client, &handle("staging", "staging-2024-01-01-1200", true))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CutoverOutcome::Updated {
                previous: "staging-2023-12-01-0900".into()
            }
        );
    }

    #[tokio::test]
    async fn current_alias_is_not_rewritten() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_environment_alias()
            .returning(|_| Ok(alias("staging-2024-01-01-1200")));
        client.expect_update_alias().never();

        let outcome = cutover(&client, &handle("staging", "staging-2024-01-01-1200", true))
            .await
            .unwrap();
        assert_eq!(outcome, CutoverOutcome::AlreadyCurrent);
    }

    #[tokio::test]
    async fn update_failure_is_non_fatal() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_environment_alias()
            .returning(|_| Ok(alias("staging-2023-12-01-0900")));
        client.expect_update_alias().returning(|_| {
            Err(ClientError::Api {
                status: 409,
                message: "VersionMismatch".into(),
            })
        });

        let err = cutover(&client, &handle("staging", "staging-2024-01-01-1200", true))
            .await
            .unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, SpaceMigError::AliasUpdateFailed { ref alias, .. } if alias == "staging"));
    }

    #[tokio::test]
    async fn missing_alias_is_non_fatal() {
        let mut client = MockResourceClient::new();
        client
            .expect_get_environment_alias()
            .returning(|name| Err(ClientError::NotFound(format!("alias {name}"))));
        client.expect_update_alias().never();

        let err = cutover(&client, &handle("master", "master-2024-01-01-1200", true))
            .await
            .unwrap_err();
        assert!(matches!(err, SpaceMigError::AliasUpdateFailed { .. }));
    }
}
