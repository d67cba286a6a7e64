//! Migration catalog
//!
//! Two sides of the same question, "what still has to run":
//! - [`MigrationDirectory`] lists the migration files available on disk
//! - [`delta`] subtracts the migrations recorded in the environment ledger

use crate::client::ResourceClient;
use crate::config::LedgerSettings;
use crate::error::{SpaceMigError, SpaceMigResult};
use crate::types::{EnvironmentHandle, EnvironmentId, MigrationId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Ledger field holding the migration id
pub const VERSION_FIELD: &str = "version";

/// Ledger field holding the completion time
pub const EXECUTED_AT_FIELD: &str = "executedAt";

static MIGRATION_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+(?:_\d+)*)\.([A-Za-z0-9]+)$").expect("migration file pattern is valid")
});

/// Directory of migration files named like `1_0_2.js`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDirectory {
    dir: PathBuf,
    extension: String,
}

impl MigrationDirectory {
    /// Create a directory view; `extension` is given without the dot
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// Migration id for a file name, `None` if the name is not a migration
    #[must_use]
    pub fn id_of(&self, file_name: &str) -> Option<MigrationId> {
        let captures = MIGRATION_FILE.captures(file_name)?;
        if captures.get(2)?.as_str() != self.extension {
            return None;
        }
        MigrationId::from_file_stem(captures.get(1)?.as_str()).ok()
    }

    /// Path of the file for `id`
    #[must_use]
    pub fn path_of(&self, id: &MigrationId) -> PathBuf {
        self.dir.join(id.file_name(&self.extension))
    }

    /// All migration ids present in the directory, in migration order
    ///
    /// Subdirectories and non-matching names are skipped.
    ///
    /// # Errors
    /// Returns [`SpaceMigError::MigrationDiscovery`] if the directory cannot be read.
    pub async fn available(&self) -> SpaceMigResult<Vec<MigrationId>> {
        let discovery = |source| SpaceMigError::MigrationDiscovery {
            dir: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(discovery)?;
        let mut ids = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await.map_err(discovery)? {
            if !entry.file_type().await.map_err(discovery)?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(|n| self.id_of(n)) {
                Some(id) => {
                    ids.insert(id);
                }
                None => tracing::debug!("Skipping {:?}: not a migration file", name),
            }
        }

        tracing::info!("Found {} migrations in {}", ids.len(), self.dir.display());
        Ok(ids.into_iter().collect())
    }
}

/// Migrations recorded as applied in an environment
///
/// Only published ledger entries count. The version is read in
/// `default_locale`, falling back to whichever locale holds a value.
///
/// # Errors
/// Returns [`SpaceMigError::Remote`] if the ledger cannot be queried.
pub async fn applied(
    client: &dyn ResourceClient,
    environment_id: &EnvironmentId,
    ledger: &LedgerSettings,
    default_locale: &str,
) -> SpaceMigResult<BTreeSet<MigrationId>> {
    let entries = client
        .query_entries(environment_id, &ledger.content_type)
        .await?;

    let mut applied = BTreeSet::new();
    for entry in &entries {
        if !entry.is_published() {
            tracing::debug!("Ignoring unpublished ledger entry {}", entry.id);
            continue;
        }
        let version = entry
            .field(VERSION_FIELD, Some(default_locale))
            .and_then(serde_json::Value::as_str)
            .map(MigrationId::parse);
        match version {
            Some(Ok(id)) => {
                applied.insert(id);
            }
            _ => tracing::warn!("Ledger entry {} has no usable version", entry.id),
        }
    }
    Ok(applied)
}

/// Available migrations not yet applied to the environment, in migration order
///
/// Read-only; calling it twice against an unchanged ledger gives the same result.
///
/// # Errors
/// Returns [`SpaceMigError::Remote`] if the ledger cannot be queried.
pub async fn delta(
    client: &dyn ResourceClient,
    handle: &EnvironmentHandle,
    available_ids: &[MigrationId],
    ledger: &LedgerSettings,
    default_locale: &str,
) -> SpaceMigResult<Vec<MigrationId>> {
    tracing::info!("Reading applied migrations from the ledger of {}", handle.id);
    let applied = applied(client, &handle.id, ledger, default_locale).await?;

    let pending: BTreeSet<MigrationId> = available_ids
        .iter()
        .filter(|id| !applied.contains(*id))
        .cloned()
        .collect();

    tracing::info!(
        "{} applied, {} to execute: {}",
        applied.len(),
        pending.len(),
        pending
            .iter()
            .map(MigrationId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(pending.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, MockResourceClient};
    use crate::provision::ProvisionAction;
    use crate::types::{Entry, Environment, EnvironmentPolicy, EnvironmentStatus, LocalizedFields};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn ids(values: &[&str]) -> Vec<MigrationId> {
        values.iter().map(|v| MigrationId::parse(v).unwrap()).collect()
    }

    fn ledger_entry(id: &str, locale: &str, version: &str, published: bool) -> Entry {
        let mut values = BTreeMap::new();
        values.insert(locale.to_string(), serde_json::json!(version));
        let mut fields = LocalizedFields::new();
        fields.insert(VERSION_FIELD.to_string(), values);
        Entry {
            id: id.to_string(),
            version: 2,
            published_version: published.then_some(1),
            fields,
        }
    }

    fn handle() -> EnvironmentHandle {
        EnvironmentHandle {
            id: "feature-x".into(),
            policy: EnvironmentPolicy::new("feature-x", false, false),
            environment: Environment {
                id: "feature-x".into(),
                name: "feature-x".into(),
                status: EnvironmentStatus::Ready,
            },
            action: ProvisionAction::Create,
        }
    }

    #[test]
    fn file_names_map_to_ids() {
        let dir = MigrationDirectory::new("migrations", "js");
        assert_eq!(dir.id_of("1_0_2.js"), Some(MigrationId::parse("1.0.2").unwrap()));
        assert_eq!(dir.id_of("7.js"), Some(MigrationId::parse("7").unwrap()));
        assert_eq!(dir.id_of("1_0_2.ts"), None);
        assert_eq!(dir.id_of("readme.js"), None);
        assert_eq!(dir.id_of("1__2.js"), None);
        assert_eq!(
            dir.path_of(&MigrationId::parse("1.0.2").unwrap()),
            PathBuf::from("migrations/1_0_2.js")
        );
    }

    #[tokio::test]
    async fn available_lists_sorted_migrations_only() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["2_0_0.js", "1_10_0.js", "1_9_0.js", "notes.md", "1_0_0.ts"] {
            std::fs::write(tmp.path().join(name), "").unwrap();
        }
        std::fs::create_dir(tmp.path().join("3_0_0.js")).unwrap();

        let dir = MigrationDirectory::new(tmp.path(), "js");
        let found = dir.available().await.unwrap();
        assert_eq!(found, ids(&["1.9.0", "1.10.0", "2.0.0"]));
    }

    #[tokio::test]
    async fn missing_directory_is_discovery_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = MigrationDirectory::new(tmp.path().join("absent"), "js");
        assert!(matches!(
            dir.available().await,
            Err(SpaceMigError::MigrationDiscovery { .. })
        ));
    }

    #[tokio::test]
    async fn delta_skips_applied_and_sorts() {
        let mut client = MockResourceClient::new();
        client
            .expect_query_entries()
            .withf(|env, content_type| env.as_str() == "feature-x" && content_type == "migrationVersions")
            .returning(|_, _| Ok(vec![ledger_entry("e1", "en-US", "1.0.0", true)]));

        let available = ids(&["2.0.0", "1.0.1", "1.0.0", "1.0.1"]);
        let pending = delta(&client, &handle(), &available, &LedgerSettings::default(), "en-US")
            .await
            .unwrap();

        assert_eq!(pending, ids(&["1.0.1", "2.0.0"]));
    }

    #[tokio::test]
    async fn delta_is_idempotent() {
        let mut client = MockResourceClient::new();
        client
            .expect_query_entries()
            .times(2)
            .returning(|_, _| Ok(vec![ledger_entry("e1", "en-US", "1.0.0", true)]));

        let available = ids(&["1.0.0", "1.0.1"]);
        let ledger = LedgerSettings::default();
        let first = delta(&client, &handle(), &available, &ledger, "en-US").await.unwrap();
        let second = delta(&client, &handle(), &available, &ledger, "en-US").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unpublished_entries_do_not_count() {
        let mut client = MockResourceClient::new();
        client.expect_query_entries().returning(|_, _| {
            Ok(vec![
                ledger_entry("e1", "en-US", "1.0.0", true),
                ledger_entry("e2", "en-US", "1.0.1", false),
            ])
        });

        let pending = delta(
            &client,
            &handle(),
            &ids(&["1.0.0", "1.0.1"]),
            &LedgerSettings::default(),
            "en-US",
        )
        .await
        .unwrap();
        assert_eq!(pending, ids(&["1.0.1"]));
    }

    #[tokio::test]
    async fn version_in_other_locale_still_counts() {
        let mut client = MockResourceClient::new();
        client
            .expect_query_entries()
            .returning(|_, _| Ok(vec![ledger_entry("e1", "de-DE", "1.0.0", true)]));

        let applied = applied(&client, &"feature-x".into(), &LedgerSettings::default(), "en-US")
            .await
            .unwrap();
        assert!(applied.contains(&MigrationId::parse("1.0.0").unwrap()));
    }

    #[tokio::test]
    async fn ledger_query_failure_is_remote_error() {
        let mut client = MockResourceClient::new();
        client
            .expect_query_entries()
            .returning(|_, _| Err(ClientError::Transport("reset".into())));

        let err = delta(&client, &handle(), &ids(&["1"]), &LedgerSettings::default(), "en-US")
            .await
            .unwrap_err();
        assert!(matches!(err, SpaceMigError::Remote(_)));
    }
}
