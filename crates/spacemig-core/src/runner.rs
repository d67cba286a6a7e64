//! Migration runner
//!
//! Executes pending migrations strictly in order. Each successful step is
//! recorded as a published ledger entry before the next step starts, so a
//! failed run leaves the ledger describing exactly what was applied.

use crate::catalog::{MigrationDirectory, EXECUTED_AT_FIELD, VERSION_FIELD};
use crate::client::{ResourceClient, StepExecutor};
use crate::context::RunContext;
use crate::error::{SpaceMigError, SpaceMigResult, StepFailure};
use crate::types::{EnvironmentHandle, EnvironmentId, LocalizedFields, MigrationId, MigrationLedgerEntry};
use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use std::collections::BTreeMap;

/// Code of the environment's default locale
///
/// # Errors
/// - `NoDefaultLocale` if no locale is flagged default
/// - `Remote` if locales cannot be listed
pub async fn default_locale(
    client: &dyn ResourceClient,
    environment_id: &EnvironmentId,
) -> SpaceMigResult<String> {
    let locales = client.list_locales(environment_id).await?;
    let locale = locales
        .into_iter()
        .find(|l| l.default)
        .ok_or_else(|| SpaceMigError::NoDefaultLocale {
            environment_id: environment_id.clone(),
        })?;
    tracing::debug!("Default locale of {} is {}", environment_id, locale.code);
    Ok(locale.code)
}

/// Runs migration files and records them in the ledger
pub struct MigrationRunner<'a> {
    client: &'a dyn ResourceClient,
    executor: &'a dyn StepExecutor,
}

impl<'a> MigrationRunner<'a> {
    /// Create a runner
    #[inline]
    #[must_use]
    pub fn new(client: &'a dyn ResourceClient, executor: &'a dyn StepExecutor) -> Self {
        Self { client, executor }
    }

    /// Run `ordered_ids` against the prepared environment
    ///
    /// Stops at the first failure; nothing after it runs. Returns the ledger
    /// entries written, in order.
    ///
    /// # Errors
    /// Returns [`SpaceMigError::MigrationStepFailed`] naming the failed id and stage.
    pub async fn run_all(
        &self,
        ctx: &RunContext,
        handle: &EnvironmentHandle,
        ordered_ids: &[MigrationId],
        default_locale: &str,
    ) -> SpaceMigResult<Vec<MigrationLedgerEntry>> {
        let directory =
            MigrationDirectory::new(&ctx.migrations_dir, &ctx.settings.migrations.extension);
        let target = ctx.step_target(&handle.id);
        let content_type = &ctx.settings.ledger.content_type;

        let mut written: Vec<MigrationLedgerEntry> = Vec::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            let file = directory.path_of(id);
            tracing::info!("Executing migration {} ({})", id, file.display());

            self.executor
                .run_step(&file, &target)
                .await
                .map_err(|e| step_failed(id, StepFailure::Execution(e)))?;

            let executed_at = next_timestamp(written.last().map(|e| e.executed_at), Utc::now());
            let fields = ledger_fields(id, executed_at, default_locale);

            let entry = self
                .client
                .create_entry(&handle.id, content_type, fields)
                .await
                .map_err(|e| step_failed(id, StepFailure::LedgerCreate(e)))?;
            self.client
                .publish_entry(&handle.id, &entry)
                .await
                .map_err(|e| step_failed(id, StepFailure::LedgerPublish(e)))?;

            tracing::info!("Saved {} to {}", id, content_type);
            written.push(MigrationLedgerEntry {
                version: id.clone(),
                executed_at,
            });
        }

        Ok(written)
    }
}

fn step_failed(id: &MigrationId, cause: StepFailure) -> SpaceMigError {
    tracing::error!("Migration {} failed: {}", id, cause);
    SpaceMigError::MigrationStepFailed {
        id: id.clone(),
        cause,
    }
}

/// Millisecond timestamp strictly after `previous`
fn next_timestamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(3);
    match previous {
        Some(previous) if now <= previous => previous + TimeDelta::milliseconds(1),
        _ => now,
    }
}

fn ledger_fields(id: &MigrationId, executed_at: DateTime<Utc>, locale: &str) -> LocalizedFields {
    let localized = |value: serde_json::Value| BTreeMap::from([(locale.to_string(), value)]);
    BTreeMap::from([
        (VERSION_FIELD.to_string(), localized(id.as_str().into())),
        (
            EXECUTED_AT_FIELD.to_string(),
            localized(executed_at.to_rfc3339_opts(SecondsFormat::Millis, true).into()),
        ),
    ])
}
