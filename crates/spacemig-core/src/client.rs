//! Collaborator boundaries
//!
//! The remote content-space API and the migration step engine are consumed
//! through these traits. Concrete implementations live in `spacemig-remote`;
//! in-memory fakes live in `spacemig-test-utils`.

use crate::types::{
    AliasRecord, ApiKey, Entry, Environment, EnvironmentId, EnvironmentStatus, LocalizedFields,
    Locale,
};
use async_trait::async_trait;
use std::path::Path;

/// Errors reported by a [`ResourceClient`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Remote rejected the request
    #[error("api error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message returned by the service
        message: String,
    },

    /// Request never completed
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be understood
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether this is a not-found error
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Space-scoped capability interface over the remote content service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch an environment, `None` if it does not exist
    async fn get_environment(&self, id: &EnvironmentId)
        -> Result<Option<Environment>, ClientError>;

    /// Create an environment with a caller chosen id
    async fn create_environment(
        &self,
        id: &EnvironmentId,
        name: &str,
    ) -> Result<Environment, ClientError>;

    /// Delete an environment
    async fn delete_environment(&self, environment: &Environment) -> Result<(), ClientError>;

    /// Current processing status of an environment
    async fn get_environment_status(
        &self,
        id: &EnvironmentId,
    ) -> Result<EnvironmentStatus, ClientError>;

    /// All API keys of the space
    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, ClientError>;

    /// Persist an API key
    async fn update_api_key(&self, key: &ApiKey) -> Result<(), ClientError>;

    /// Fetch an environment alias
    async fn get_environment_alias(&self, name: &str) -> Result<AliasRecord, ClientError>;

    /// Persist an environment alias
    async fn update_alias(&self, alias: &AliasRecord) -> Result<(), ClientError>;

    /// Locales of an environment
    async fn list_locales(&self, environment: &EnvironmentId) -> Result<Vec<Locale>, ClientError>;

    /// All entries of a content type, drafts included
    async fn query_entries(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
    ) -> Result<Vec<Entry>, ClientError>;

    /// Create a draft entry
    async fn create_entry(
        &self,
        environment: &EnvironmentId,
        content_type: &str,
        fields: LocalizedFields,
    ) -> Result<Entry, ClientError>;

    /// Publish an entry
    async fn publish_entry(
        &self,
        environment: &EnvironmentId,
        entry: &Entry,
    ) -> Result<(), ClientError>;
}

/// Where a migration step runs
#[derive(Clone, PartialEq, Eq)]
pub struct StepTarget {
    pub space_id: String,
    pub environment_id: EnvironmentId,
    pub access_token: String,
}

impl std::fmt::Debug for StepTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTarget")
            .field("space_id", &self.space_id)
            .field("environment_id", &self.environment_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Failure reported by a [`StepExecutor`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StepError {
    /// What went wrong
    pub message: String,
}

impl StepError {
    /// Create a step error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes one migration file against an environment
///
/// Opaque to the runner: the content-model transformation inside a file is
/// owned by the executor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run the migration file
    async fn run_step(&self, file: &Path, target: &StepTarget) -> Result<(), StepError>;
}
