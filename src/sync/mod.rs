// ddbsync/src/sync/mod.rs
pub(crate) mod diff;
pub(crate) mod engine;
pub(crate) mod scanner;
#[cfg(test)]
pub(crate) mod testing;
pub(crate) mod writer;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::operator::{Operator, complete_selection, complete_table_name};
use crate::table::DynamoDbTable;
use engine::{SyncEngine, SyncOptions, SyncOutcome, SyncReport};
use writer::BatchWriter;

const DEFAULT_TABLE_NAME: &str = "planned-menu-data";
const DEFAULT_PROFILE: &str = "default";

/// Command-line switches of the sync operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncFlags {
    pub dry_run: bool,
    pub assume_yes: bool,
}

/// Public entry point for the sync process.
/// Resolves both tables, connects to them and runs the engine once.
pub async fn run_sync_flow(
    app_config: &AppConfig,
    operator: &dyn Operator,
    flags: SyncFlags,
    cancel: CancellationToken,
) -> Result<SyncReport> {
    let sync_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Sync(cfg)) => cfg,
        _ => anyhow::bail!("Sync operation selected but no sync configuration found."),
    };

    let table_name = complete_table_name(operator, &sync_config.table_name, DEFAULT_TABLE_NAME)?;
    let (source_env, source_profile) = complete_selection(
        operator,
        "Source",
        &sync_config.source,
        &app_config.environments,
        DEFAULT_PROFILE,
    )?;
    let (target_env, target_profile) = complete_selection(
        operator,
        "Target",
        &sync_config.target,
        &app_config.environments,
        DEFAULT_PROFILE,
    )?;

    let source_ref = app_config
        .environments
        .resolve(&table_name, &source_env, &source_profile)
        .context("Failed to resolve source table")?;
    let target_ref = app_config
        .environments
        .resolve(&table_name, &target_env, &target_profile)
        .context("Failed to resolve target table")?;
    if source_ref.same_table_as(&target_ref) {
        anyhow::bail!(
            "Source and target both resolve to {} in {} with profile {}; nothing to sync.",
            source_ref.name,
            source_ref.environment,
            source_ref.profile
        );
    }
    let writer = BatchWriter::new(sync_config.chunk_size).context("Invalid chunk size")?;

    println!("Source: {} ({}, profile {})", source_ref.name, source_ref.environment, source_ref.profile);
    println!("Target: {} ({}, profile {})", target_ref.name, target_ref.environment, target_ref.profile);

    let source = DynamoDbTable::connect(&source_ref, &app_config.aws).await;
    let target = DynamoDbTable::connect(&target_ref, &app_config.aws).await;

    let options = SyncOptions {
        identity_attribute: sync_config.identity_attribute.clone(),
        dry_run: flags.dry_run,
        assume_yes: flags.assume_yes,
        offer_scan_resume: !flags.assume_yes,
    };
    let report = SyncEngine::new(&source, &target, operator, writer, options, cancel)
        .run()
        .await;
    Ok(report)
}

/// Turns a failed run into an error for the process exit status.
pub fn into_result(report: SyncReport) -> Result<SyncOutcome> {
    match report.outcome {
        SyncOutcome::Failed { phase, error } => {
            Err(anyhow::Error::new(error).context(format!("Sync failed during {}", phase)))
        }
        outcome => Ok(outcome),
    }
}
