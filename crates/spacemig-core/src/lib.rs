//! spacemig core - environment provisioning and migration sequencing
//!
//! Brings a hosted content space environment up to date:
//! - Classifies the target environment as aliased, persistent or transient
//! - Creates, reuses or recreates the backing environment and waits for readiness
//! - Grants API keys access to it
//! - Runs pending migrations in order, recording each in a ledger
//! - Repoints the alias at the new environment
//!
//! # Example
//!
//! ```rust,ignore
//! use spacemig_core::{Orchestrator, RunContext, Settings};
//! use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn spacemig_core::ResourceClient>,
//! #                  executor: Arc<dyn spacemig_core::StepExecutor>) -> spacemig_core::SpaceMigResult<()> {
//! let ctx = RunContext::new("space-id", "staging", "CFPAT-...")
//!     .with_migrations_dir("migrations")
//!     .with_settings(Settings::new());
//!
//! let report = Orchestrator::new(client, executor).run(&ctx).await?;
//! println!("Applied {} migrations to {}", report.applied.len(), report.environment_id);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod catalog;
pub mod client;
pub mod config;
pub mod context;
pub mod credentials;
pub mod cutover;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod provision;
pub mod runner;
pub mod types;

// Re-exports for convenience
pub use catalog::{delta, MigrationDirectory};
pub use client::{ClientError, ResourceClient, StepError, StepExecutor, StepTarget};
pub use config::{
    ConfigFormat, ConfigSource, EnvironmentOverride, ExecutorSettings, LedgerSettings,
    MigrationSettings, ProvisioningSettings, Settings,
};
pub use context::RunContext;
pub use credentials::{propagate, KeyFailure, PropagationReport};
pub use cutover::{cutover, CutoverOutcome};
pub use error::{SpaceMigError, SpaceMigResult, StepFailure};
pub use orchestrator::{Orchestrator, RunReport};
pub use provision::{EnvironmentProvisioner, ProvisionAction};
pub use runner::{default_locale, MigrationRunner};
pub use types::{
    AliasRecord, ApiKey, Entry, Environment, EnvironmentHandle, EnvironmentId, EnvironmentPolicy,
    EnvironmentStatus, Locale, LocalizedFields, MigrationId, MigrationLedgerEntry, PolicyKind,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with spacemig core
    pub use crate::{
        ConfigSource, EnvironmentId, MigrationId, Orchestrator, ResourceClient, RunContext,
        RunReport, Settings, SpaceMigError, SpaceMigResult, StepExecutor,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
