//! Testing utilities for spacemig workspace
//!
//! In-memory stand-ins for the remote content space and the migration step
//! engine, with call logs and failure injection.

#![allow(missing_docs)]

use async_trait::async_trait;
use spacemig_core::{
    AliasRecord, ApiKey, ClientError, Entry, Environment, EnvironmentId, EnvironmentStatus,
    LocalizedFields, Locale, ResourceClient, StepError, StepExecutor, StepTarget,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Remote call observed by [`InMemoryClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetEnvironment(String),
    CreateEnvironment(String),
    DeleteEnvironment(String),
    GetEnvironmentStatus(String),
    ListApiKeys,
    UpdateApiKey(String),
    GetEnvironmentAlias(String),
    UpdateAlias { alias: String, target: String },
    ListLocales(String),
    QueryEntries { environment: String, content_type: String },
    CreateEntry { environment: String, content_type: String },
    PublishEntry { environment: String, entry: String },
}

/// Operation made to fail by [`InMemoryClient::failing`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Failure {
    ListApiKeys,
    UpdateApiKey(String),
    GetEnvironmentAlias,
    UpdateAlias,
    CreateEntry,
    PublishEntry,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    environment: String,
    content_type: String,
    entry: Entry,
}

#[derive(Debug)]
struct SpaceState {
    environments: BTreeMap<String, Environment>,
    status_script: VecDeque<EnvironmentStatus>,
    status_fallback: EnvironmentStatus,
    api_keys: BTreeMap<String, ApiKey>,
    aliases: BTreeMap<String, AliasRecord>,
    locales: Vec<Locale>,
    entries: Vec<StoredEntry>,
    failures: BTreeSet<Failure>,
    calls: Vec<Call>,
    next_entry: u64,
}

impl Default for SpaceState {
    fn default() -> Self {
        Self {
            environments: BTreeMap::new(),
            status_script: VecDeque::new(),
            status_fallback: EnvironmentStatus::Ready,
            api_keys: BTreeMap::new(),
            aliases: BTreeMap::new(),
            locales: vec![Locale {
                code: "en-US".to_string(),
                default: true,
            }],
            entries: Vec::new(),
            failures: BTreeSet::new(),
            calls: Vec::new(),
            next_entry: 1,
        }
    }
}

fn injected(what: &str) -> ClientError {
    ClientError::Api {
        status: 500,
        message: format!("injected failure: {what}"),
    }
}

fn version_mismatch(what: &str) -> ClientError {
    ClientError::Api {
        status: 409,
        message: format!("VersionMismatch: {what}"),
    }
}

/// In-memory content space
///
/// Environment status checks pop the status script first and fall back to
/// [`InMemoryClient::with_status_fallback`] (ready by default). Versioned
/// records (API keys, aliases) reject stale writes like the real service.
#[derive(Debug, Default)]
pub struct InMemoryClient {
    state: Mutex<SpaceState>,
}

impl InMemoryClient {
    /// Empty space with a single default `en-US` locale
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SpaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with(self, f: impl FnOnce(&mut SpaceState)) -> Self {
        f(&mut self.state());
        self
    }

    /// With an existing ready environment
    #[must_use]
    pub fn with_environment(self, id: &str) -> Self {
        self.with(|s| {
            s.environments.insert(
                id.to_string(),
                Environment {
                    id: id.into(),
                    name: id.to_string(),
                    status: EnvironmentStatus::Ready,
                },
            );
        })
    }

    /// With an API key granting `environments`
    #[must_use]
    pub fn with_api_key(self, id: &str, environments: &[&str]) -> Self {
        self.with(|s| {
            s.api_keys.insert(
                id.to_string(),
                ApiKey {
                    id: id.to_string(),
                    name: format!("{id} key"),
                    description: None,
                    version: 1,
                    environments: environments.iter().map(ToString::to_string).collect(),
                },
            );
        })
    }

    /// With an alias pointing at `target`
    #[must_use]
    pub fn with_alias(self, name: &str, target: &str) -> Self {
        self.with(|s| {
            s.aliases.insert(
                name.to_string(),
                AliasRecord {
                    name: name.to_string(),
                    target_environment_id: target.to_string(),
                    version: 1,
                },
            );
        })
    }

    /// Replace the locales
    #[must_use]
    pub fn with_locales(self, locales: &[(&str, bool)]) -> Self {
        self.with(|s| {
            s.locales = locales
                .iter()
                .map(|(code, default)| Locale {
                    code: (*code).to_string(),
                    default: *default,
                })
                .collect();
        })
    }

    /// With an existing `migrationVersions` entry for `version`
    #[must_use]
    pub fn with_ledger_entry(self, environment: &str, version: &str, published: bool) -> Self {
        self.with(|s| {
            let mut fields = LocalizedFields::new();
            fields.insert(
                "version".to_string(),
                BTreeMap::from([("en-US".to_string(), serde_json::json!(version))]),
            );
            fields.insert(
                "executedAt".to_string(),
                BTreeMap::from([(
                    "en-US".to_string(),
                    serde_json::json!("2023-12-01T09:00:00.000Z"),
                )]),
            );
            let id = format!("entry-{}", s.next_entry);
            s.next_entry += 1;
            s.entries.push(StoredEntry {
                environment: environment.to_string(),
                content_type: "migrationVersions".to_string(),
                entry: Entry {
                    id,
                    version: if published { 2 } else { 1 },
                    published_version: published.then_some(1),
                    fields,
                },
            });
        })
    }

    /// Statuses returned by successive status checks
    #[must_use]
    pub fn with_status_script(self, statuses: impl IntoIterator<Item = EnvironmentStatus>) -> Self {
        self.with(|s| s.status_script.extend(statuses))
    }

    /// Status returned once the script is exhausted
    #[must_use]
    pub fn with_status_fallback(self, status: EnvironmentStatus) -> Self {
        self.with(|s| s.status_fallback = status)
    }

    /// Make an operation fail
    #[must_use]
    pub fn failing(self, failure: Failure) -> Self {
        self.with(|s| {
            s.failures.insert(failure);
        })
    }

    /// Every call made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of calls matching `predicate`
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Whether the environment exists
    #[must_use]
    pub fn has_environment(&self, id: &str) -> bool {
        self.state().environments.contains_key(id)
    }

    /// Current target of an alias
    #[must_use]
    pub fn alias_target(&self, name: &str) -> Option<String> {
        self.state()
            .aliases
            .get(name)
            .map(|a| a.target_environment_id.clone())
    }

    /// Environments granted to an API key
    #[must_use]
    pub fn key_environments(&self, id: &str) -> Vec<String> {
        self.state()
            .api_keys
            .get(id)
            .map(|k| k.environments.clone())
            .unwrap_or_default()
    }

    /// Ledger entries of an environment in creation order, drafts included
    #[must_use]
    pub fn ledger(&self, environment: &str) -> Vec<Entry> {
        self.state()
            .entries
            .iter()
            .filter(|e| e.environment == environment && e.content_type == "migrationVersions")
            .map(|e| e.entry.clone())
            .collect()
    }

    /// Published ledger versions of an environment in creation order
    #[must_use]
    pub fn published_versions(&self, environment: &str) -> Vec<String> {
        self.ledger(environment)
            .iter()
            .filter(|e| e.is_published())
            .filter_map(|e| e.field("version", None)?.as_str().map(ToString::to_string))
            .collect()
    }
}

#[async_trait]
impl ResourceClient for InMemoryClient {
    async fn get_environment(&self, id: &EnvironmentId) -> Result<Option<Environment>, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::GetEnvironment(id.to_string()));
        Ok(s.environments.get(id.as_str()).cloned())
    }

    async fn create_environment(
        &self,
        id: &EnvironmentId,
        name: &str,
    ) -> Result<Environment, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::CreateEnvironment(id.to_string()));
        if s.environments.contains_key(id.as_str()) {
            return Err(ClientError::Api {
                status: 409,
                message: format!("environment {id} exists"),
            });
        }
        let environment = Environment {
            id: id.clone(),
            name: name.to_string(),
            status: EnvironmentStatus::Processing,
        };
        s.environments.insert(id.to_string(), environment.clone());
        Ok(environment)
    }

    async fn delete_environment(&self, environment: &Environment) -> Result<(), ClientError> {
        let mut s = self.state();
        s.calls.push(Call::DeleteEnvironment(environment.id.to_string()));
        let id = environment.id.as_str();
        s.environments
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::NotFound(format!("environment {id}")))?;
        s.entries.retain(|e| e.environment != id);
        Ok(())
    }

    async fn get_environment_status(
        &self,
        id: &EnvironmentId,
    ) -> Result<EnvironmentStatus, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::GetEnvironmentStatus(id.to_string()));
        if !s.environments.contains_key(id.as_str()) {
            return Err(ClientError::NotFound(format!("environment {id}")));
        }
        let status = s.status_script.pop_front().unwrap_or(s.status_fallback);
        if let Some(environment) = s.environments.get_mut(id.as_str()) {
            environment.status = status;
        }
        Ok(status)
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::ListApiKeys);
        if s.failures.contains(&Failure::ListApiKeys) {
            return Err(injected("list api keys"));
        }
        Ok(s.api_keys.values().cloned().collect())
    }

    async fn update_api_key(&self, key: &ApiKey) -> Result<(), ClientError> {
        let mut s = self.state();
        s.calls.push(Call::UpdateApiKey(key.id.clone()));
        if s.failures.contains(&Failure::UpdateApiKey(key.id.clone())) {
            return Err(injected(&format!("update api key {}", key.id)));
        }
        let stored = s
            .api_keys
            .get_mut(&key.id)
            .ok_or_else(|| ClientError::NotFound(format!("api key {}", key.id)))?;
        if stored.version != key.version {
            return Err(version_mismatch(&key.id));
        }
        *stored = ApiKey {
            version: key.version + 1,
            ..key.clone()
        };
        Ok(())
    }

    async fn get_environment_alias(&self, name: &str) -> Result<AliasRecord, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::GetEnvironmentAlias(name.to_string()));
        if s.failures.contains(&Failure::GetEnvironmentAlias) {
            return Err(injected("get alias"));
        }
        s.aliases
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("alias {name}")))
    }

    async fn update_alias(&self, alias: &AliasRecord) -> Result<(), ClientError> {
        let mut s = self.state();
        s.calls.push(Call::UpdateAlias {
            alias: alias.name.clone(),
            target: alias.target_environment_id.clone(),
        });
        if s.failures.contains(&Failure::UpdateAlias) {
            return Err(injected("update alias"));
        }
        let stored = s
            .aliases
            .get_mut(&alias.name)
            .ok_or_else(|| ClientError::NotFound(format!("alias {}", alias.name)))?;
        if stored.version != alias.version {
            return Err(version_mismatch(&alias.name));
        }
        *stored = AliasRecord {
            version: alias.version + 1,
            ..alias.clone()
        };
        Ok(())
    }

    async fn list_locales(&self, environment: &EnvironmentId) -> Result<Vec<Locale>, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::ListLocales(environment.to_string()));
        Ok(s.locales.clone())
    }

    async fn query_entries(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
    ) -> Result<Vec<Entry>, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::QueryEntries {
            environment: environment.to_string(),
            content_type: content_type.to_string(),
        });
        Ok(s.entries
            .iter()
            .filter(|e| e.environment == environment.as_str() && e.content_type == content_type)
            .map(|e| e.entry.clone())
            .collect())
    }

    async fn create_entry(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
        fields: LocalizedFields,
    ) -> Result<Entry, ClientError> {
        let mut s = self.state();
        s.calls.push(Call::CreateEntry {
            environment: environment.to_string(),
            content_type: content_type.to_string(),
        });
        if s.failures.contains(&Failure::CreateEntry) {
            return Err(injected("create entry"));
        }
        let entry = Entry {
            id: format!("entry-{}", s.next_entry),
            version: 1,
            published_version: None,
            fields,
        };
        s.next_entry += 1;
        s.entries.push(StoredEntry {
            environment: environment.to_string(),
            content_type: content_type.to_string(),
            entry: entry.clone(),
        });
        Ok(entry)
    }

    async fn publish_entry(&self, environment: &EnvironmentId, entry: &Entry) -> Result<(), ClientError> {
        let mut s = self.state();
        s.calls.push(Call::PublishEntry {
            environment: environment.to_string(),
            entry: entry.id.clone(),
        });
        if s.failures.contains(&Failure::PublishEntry) {
            return Err(injected("publish entry"));
        }
        let stored = s
            .entries
            .iter_mut()
            .find(|e| e.environment == environment.as_str() && e.entry.id == entry.id)
            .ok_or_else(|| ClientError::NotFound(format!("entry {}", entry.id)))?;
        if stored.entry.version != entry.version {
            return Err(version_mismatch(&entry.id));
        }
        stored.entry.published_version = Some(entry.version);
        stored.entry.version += 1;
        Ok(())
    }
}

/// Step executor that records runs and fails on chosen files
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    failing: BTreeSet<String>,
    runs: Mutex<Vec<(String, StepTarget)>>,
}

impl ScriptedExecutor {
    /// Executor where every step succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the step whose file name is `file_name`
    #[must_use]
    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    /// File names of every step run so far, failed ones included
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(file, _)| file.clone())
            .collect()
    }

    /// Targets of every step run so far
    #[must_use]
    pub fn targets(&self) -> Vec<StepTarget> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, target)| target.clone())
            .collect()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn run_step(&self, file: &Path, target: &StepTarget) -> Result<(), StepError> {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.clone(), target.clone()));
        if self.failing.contains(&name) {
            return Err(StepError::new(format!("{name}: scripted failure")));
        }
        Ok(())
    }
}
