//! Run orchestration
//!
//! Sequences one run end to end:
//! - Resolve the policy and the backing environment id
//! - Provision the environment and wait for readiness
//! - Grant API keys access (non-fatal)
//! - Compute and run pending migrations
//! - Repoint the alias (non-fatal)

use crate::catalog::{self, MigrationDirectory};
use crate::client::{ResourceClient, StepExecutor};
use crate::context::RunContext;
use crate::credentials::{self, PropagationReport};
use crate::cutover::{self, CutoverOutcome};
use crate::error::{SpaceMigError, SpaceMigResult};
use crate::policy;
use crate::provision::{EnvironmentProvisioner, ProvisionAction};
use crate::runner::{self, MigrationRunner};
use crate::types::{EnvironmentId, EnvironmentPolicy, MigrationLedgerEntry};
use std::sync::Arc;

/// Summary of a completed run
#[derive(Debug)]
pub struct RunReport {
    /// Environment the migrations ran against
    pub environment_id: EnvironmentId,
    /// Resolved policy
    pub policy: EnvironmentPolicy,
    /// What provisioning did
    pub action: ProvisionAction,
    /// API key propagation results
    pub credentials: PropagationReport,
    /// Ledger entries written by this run
    pub applied: Vec<MigrationLedgerEntry>,
    /// Cutover result, `None` if the alias update failed
    pub cutover: Option<CutoverOutcome>,
    /// Non-fatal errors raised along the way
    pub warnings: Vec<SpaceMigError>,
}

impl RunReport {
    /// Whether any non-fatal phase reported a problem
    #[inline]
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Drives a run against its collaborators
pub struct Orchestrator {
    client: Arc<dyn ResourceClient>,
    executor: Arc<dyn StepExecutor>,
}

impl Orchestrator {
    /// Create an orchestrator
    #[must_use]
    pub fn new(client: Arc<dyn ResourceClient>, executor: Arc<dyn StepExecutor>) -> Self {
        Self { client, executor }
    }

    /// Execute one run
    ///
    /// # Workflow
    /// 1. Resolve policy and environment id
    /// 2. Provision
    /// 3. Propagate credentials
    /// 4. Resolve the default locale
    /// 5. Discover migrations and compute the delta
    /// 6. Run migrations
    /// 7. Cut over the alias
    ///
    /// # Errors
    /// Any fatal [`SpaceMigError`]. Credential and alias failures are
    /// collected in [`RunReport::warnings`] instead.
    pub async fn run(&self, ctx: &RunContext) -> SpaceMigResult<RunReport> {
        let client = self.client.as_ref();
        let mut warnings = Vec::new();

        // 1. Policy and id are fixed for the whole run
        let policy = policy::resolve_with(&ctx.settings, &ctx.environment_name);
        let environment_id = policy::resolve_environment_id(&policy, ctx.started_at);
        tracing::info!(
            "Running migrations for {} in space {} (policy: {}, environment: {})",
            ctx.environment_name,
            ctx.space_id,
            policy.kind(),
            environment_id
        );

        // 2. Provision
        let handle = EnvironmentProvisioner::new(client, ctx.settings.provisioning)
            .prepare(&environment_id, &policy)
            .await?;

        // 3. Credentials
        let credentials = credentials::propagate(client, &handle.id).await;
        if let Some(warning) = credentials.warning(&handle.id) {
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        // 4. Locale for ledger fields
        let locale = runner::default_locale(client, &handle.id).await?;

        // 5. Delta
        let directory =
            MigrationDirectory::new(&ctx.migrations_dir, &ctx.settings.migrations.extension);
        let available = directory.available().await?;
        let pending = catalog::delta(client, &handle, &available, &ctx.settings.ledger, &locale).await?;

        // 6. Migrations
        let applied = MigrationRunner::new(client, self.executor.as_ref())
            .run_all(ctx, &handle, &pending, &locale)
            .await?;
        tracing::info!("{} migrations applied to {}", applied.len(), handle.id);

        // 7. Cutover
        let cutover = match cutover::cutover(client, &handle).await {
            Ok(outcome) => Some(outcome),
            Err(warning) => {
                tracing::warn!("{}", warning);
                warnings.push(warning);
                None
            }
        };

        tracing::info!("All done");
        Ok(RunReport {
            environment_id: handle.id,
            policy: handle.policy,
            action: handle.action,
            credentials,
            applied,
            cutover,
            warnings,
        })
    }
}
