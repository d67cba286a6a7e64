//! Core types for spacemig
//!
//! Defines the fundamental records shared by every phase:
//! - Environment policy and the resolved environment id
//! - Remote records (environments, API keys, aliases, locales, entries)
//! - Migration ids and ledger entries

use crate::provision::ProvisionAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Policy kind derived from an [`EnvironmentPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Fronted by an alias; a fresh environment is created on every run
    Aliased,
    /// Reused and mutated in place across runs
    Persistent,
    /// Destroyed and recreated on every run
    Transient,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aliased => write!(f, "aliased"),
            Self::Persistent => write!(f, "persistent"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

/// Fully resolved policy for one target environment
///
/// Built once per run by [`crate::policy::resolve`]. When `aliased` is true
/// `persistent` is always false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPolicy {
    /// Logical environment name (also the alias name for aliased policies)
    pub environment_name: String,
    /// Whether the name is an alias repointed after every run
    pub aliased: bool,
    /// Whether the environment is reused across runs
    pub persistent: bool,
}

impl EnvironmentPolicy {
    /// Create a policy, normalising `persistent` away for aliased environments
    #[inline]
    #[must_use]
    pub fn new(environment_name: impl Into<String>, aliased: bool, persistent: bool) -> Self {
        Self {
            environment_name: environment_name.into(),
            aliased,
            persistent: persistent && !aliased,
        }
    }

    /// Classify the policy
    #[inline]
    #[must_use]
    pub fn kind(&self) -> PolicyKind {
        if self.aliased {
            PolicyKind::Aliased
        } else if self.persistent {
            PolicyKind::Persistent
        } else {
            PolicyKind::Transient
        }
    }
}

/// Identifier of the concrete remote environment backing a policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(pub String);

impl EnvironmentId {
    /// Borrow the raw id
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EnvironmentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Processing status reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    /// Environment can be used
    Ready,
    /// Environment creation failed permanently
    Failed,
    /// Environment is still being copied
    Processing,
}

impl EnvironmentStatus {
    /// Map a remote status string; anything unknown is still processing
    #[must_use]
    pub fn from_remote(status: &str) -> Self {
        match status {
            "ready" => Self::Ready,
            "failed" => Self::Failed,
            _ => Self::Processing,
        }
    }
}

/// Remote environment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Environment id
    pub id: EnvironmentId,
    /// Display name
    pub name: String,
    /// Status at the time the record was fetched
    pub status: EnvironmentStatus,
}

/// Environment prepared for migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Resolved environment id
    pub id: EnvironmentId,
    /// Policy the environment was prepared under
    pub policy: EnvironmentPolicy,
    /// Remote record as last observed
    pub environment: Environment,
    /// What provisioning did to get here
    pub action: ProvisionAction,
}

/// Content delivery API key with its environment grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Key id
    pub id: String,
    /// Key name
    pub name: String,
    /// Free-form description, written back unchanged
    #[serde(default)]
    pub description: Option<String>,
    /// Remote version for optimistic concurrency
    pub version: u64,
    /// Ids of environments this key may read
    pub environments: Vec<String>,
}

impl ApiKey {
    /// Whether the key already grants the environment
    #[inline]
    #[must_use]
    pub fn grants(&self, environment: &EnvironmentId) -> bool {
        self.environments.iter().any(|e| e == environment.as_str())
    }
}

/// Environment alias pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    /// Alias name
    pub name: String,
    /// Environment the alias currently serves
    pub target_environment_id: String,
    /// Remote version for optimistic concurrency
    pub version: u64,
}

/// Locale of an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    /// Locale code, e.g. `en-US`
    pub code: String,
    /// Whether this is the default locale
    pub default: bool,
}

/// Entry field values: field id → locale code → value
pub type LocalizedFields = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// Content entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Entry id
    pub id: String,
    /// Remote version for optimistic concurrency
    pub version: u64,
    /// Version at last publish, `None` for drafts
    pub published_version: Option<u64>,
    /// Localized field values
    pub fields: LocalizedFields,
}

impl Entry {
    /// Whether the entry has been published
    #[inline]
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.published_version.is_some()
    }

    /// Field value in `locale`, falling back to any locale present
    #[must_use]
    pub fn field(&self, name: &str, locale: Option<&str>) -> Option<&serde_json::Value> {
        let values = self.fields.get(name)?;
        locale
            .and_then(|l| values.get(l))
            .or_else(|| values.values().next())
    }
}

/// Error parsing a [`MigrationId`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid migration id '{0}': expected dot separated numbers")]
pub struct MigrationIdError(pub String);

/// Ordered migration identifier, a dotted version such as `1.0.2`
///
/// Equality is string equality. Ordering compares dot separated segments
/// numerically and falls back to the raw string, so `1.10 > 1.9` and
/// `01 < 1` keep the order total and consistent with `Eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MigrationId(String);

impl MigrationId {
    /// Parse a dotted version
    ///
    /// # Errors
    /// Returns [`MigrationIdError`] unless every segment is a non-empty run of digits.
    pub fn parse(value: &str) -> Result<Self, MigrationIdError> {
        let valid = !value.is_empty()
            && value
                .split('.')
                .all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()));
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(MigrationIdError(value.to_string()))
        }
    }

    /// Id of a migration file stem, `1_0_2` → `1.0.2`
    ///
    /// # Errors
    /// Returns [`MigrationIdError`] if the stem is not underscore separated digits.
    pub fn from_file_stem(stem: &str) -> Result<Self, MigrationIdError> {
        Self::parse(&stem.replace('_', "."))
            .map_err(|_| MigrationIdError(stem.to_string()))
    }

    /// File name of this migration, `1.0.2` → `1_0_2.js`
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0.replace('.', "_"), extension)
    }

    /// Borrow the raw version string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

impl Ord for MigrationId {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut lhs = self.0.split('.');
        let mut rhs = other.0.split('.');
        loop {
            match (lhs.next(), rhs.next()) {
                (Some(a), Some(b)) => match cmp_numeric(a, b) {
                    Ordering::Equal => {}
                    unequal => return unequal,
                },
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (None, None) => break,
            }
        }
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for MigrationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for MigrationId {
    type Err = MigrationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MigrationId {
    type Error = MigrationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MigrationId> for String {
    fn from(value: MigrationId) -> Self {
        value.0
    }
}

impl std::fmt::Display for MigrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One applied migration as recorded in the environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationLedgerEntry {
    /// Applied migration
    pub version: MigrationId,
    /// When the migration finished
    pub executed_at: DateTime<Utc>,
}
