//! Run configuration
//!
//! Settings are read from a single file whose format follows its extension:
//! - `.toml` via toml
//! - `.yaml` / `.yml` via serde_yaml
//! - `.json` via serde_json
//!
//! Every section is optional; a missing section takes its defaults.

use crate::error::{SpaceMigError, SpaceMigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Names that front an alias unless configured otherwise
pub const DEFAULT_PROTECTED: [&str; 3] = ["master", "staging", "integration"];

/// Content type holding the migration ledger
pub const DEFAULT_LEDGER_CONTENT_TYPE: &str = "migrationVersions";

/// Config file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a path's extension, TOML when unknown
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Explicit per-environment settings; absent fields fall back to defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentOverride {
    /// Whether the name fronts an alias
    pub alias: Option<bool>,
    /// Whether the environment is reused across runs
    pub persistent: Option<bool>,
}

/// Readiness polling bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningSettings {
    /// Status checks before giving up
    pub max_attempts: u32,
    /// Seconds between status checks
    pub poll_interval_secs: u64,
}

impl ProvisioningSettings {
    /// Check the bounds; a zero interval polls back to back
    ///
    /// # Errors
    /// Returns a message if no status check would ever be made.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("provisioning.max_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Delay between status checks
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            poll_interval_secs: 3,
        }
    }
}

/// Where the ledger lives inside an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Content type of ledger entries
    pub content_type: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_LEDGER_CONTENT_TYPE.to_string(),
        }
    }
}

/// Migration file discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Extension of migration files, without the dot
    pub extension: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            extension: "js".to_string(),
        }
    }
}

/// External command running one migration file
///
/// `{space_id}`, `{environment_id}`, `{access_token}` and `{file}` in `args`
/// are substituted per step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Program to spawn
    pub program: String,
    /// Argument templates
    pub args: Vec<String>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        let args = [
            "space",
            "migration",
            "--space-id",
            "{space_id}",
            "--environment-id",
            "{environment_id}",
            "--management-token",
            "{access_token}",
            "--yes",
            "{file}",
        ];
        Self {
            program: "contentful".to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Where settings come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Built-in defaults only
    Defaults,
    /// A config file
    File(std::path::PathBuf),
}

impl ConfigSource {
    /// Read the settings
    ///
    /// # Errors
    /// Returns [`SpaceMigError::ConfigNotFound`] if a file source cannot be read or parsed.
    pub fn load(&self) -> SpaceMigResult<Settings> {
        match self {
            Self::Defaults => Ok(Settings::default()),
            Self::File(path) => Settings::load(path),
        }
    }
}

/// spacemig configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Names that default to aliased
    pub protected: Vec<String>,
    /// Explicit per-environment settings
    pub environments: BTreeMap<String, EnvironmentOverride>,
    /// Readiness polling
    pub provisioning: ProvisioningSettings,
    /// Ledger location
    pub ledger: LedgerSettings,
    /// Migration discovery
    pub migrations: MigrationSettings,
    /// Step execution command
    pub executor: ExecutorSettings,
}

impl Settings {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a file
    ///
    /// # Errors
    /// Returns [`SpaceMigError::ConfigNotFound`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> SpaceMigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SpaceMigError::config_not_found(path, e))?;
        let settings = Self::parse(&content, ConfigFormat::from_path(path))
            .map_err(|reason| SpaceMigError::config_not_found(path, reason))?;
        tracing::debug!(
            "Loaded config from {} ({} explicit environments)",
            path.display(),
            settings.environments.len()
        );
        Ok(settings)
    }

    /// Parse settings from a string
    ///
    /// # Errors
    /// Returns the parser's message if `content` is not valid for `format`,
    /// or the reason the parsed values are unusable.
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, String> {
        let settings = Self::parse_format(content, format)?;
        settings.provisioning.validate()?;
        Ok(settings)
    }

    fn parse_format(content: &str, format: ConfigFormat) -> Result<Self, String> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => {
                // An empty YAML document is null, not an empty mapping
                if content.trim().is_empty() {
                    return Ok(Self::default());
                }
                serde_yaml::from_str(content).map_err(|e| e.to_string())
            }
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }

    /// Whether the name defaults to aliased
    #[must_use]
    pub fn is_protected(&self, environment_name: &str) -> bool {
        self.protected.iter().any(|p| p == environment_name)
    }

    /// With an explicit environment override
    #[inline]
    #[must_use]
    pub fn with_environment(
        mut self,
        name: impl Into<String>,
        environment: EnvironmentOverride,
    ) -> Self {
        self.environments.insert(name.into(), environment);
        self
    }

    /// With protected names
    #[inline]
    #[must_use]
    pub fn with_protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = names.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            protected: DEFAULT_PROTECTED.iter().map(ToString::to_string).collect(),
            environments: BTreeMap::new(),
            provisioning: ProvisioningSettings::default(),
            ledger: LedgerSettings::default(),
            migrations: MigrationSettings::default(),
            executor: ExecutorSettings::default(),
        }
    }
}
