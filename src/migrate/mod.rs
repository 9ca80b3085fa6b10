// ddbsync/src/migrate/mod.rs
pub(crate) mod export;
pub(crate) mod import;
pub(crate) mod manifest;

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use aws_sdk_dynamodb as dynamodb;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{AppConfig, load_sdk_config, parse_index_names};
use crate::errors::MigrationError;
use crate::operator::{Operator, complete_selection, complete_table_name};
use import::ImportRequest;

const DEFAULT_SOURCE_PROFILE: &str = "prod";
const DEFAULT_TARGET_PROFILE: &str = "local";

/// How long and how often to wait for a server-side export or import job.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_wait: Duration,
    pub cancel: CancellationToken,
}

/// One observation of a long-running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    Running,
    Done(T),
    Failed { status: String, message: String },
}

/// Calls `check` every `interval` until the job is done, failed, cancelled or
/// `max_wait` has elapsed.
pub async fn wait_for<T, F, Fut>(
    operation: &'static str,
    table: &str,
    settings: &PollSettings,
    mut check: F,
) -> Result<T, MigrationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus<T>, MigrationError>>,
{
    let started = Instant::now();
    loop {
        match check().await? {
            JobStatus::Done(value) => return Ok(value),
            JobStatus::Failed { status, message } => {
                return Err(MigrationError::Unsuccessful {
                    operation,
                    table: table.to_string(),
                    status,
                    message,
                });
            }
            JobStatus::Running => {}
        }

        let waited = started.elapsed();
        if waited >= settings.max_wait {
            return Err(MigrationError::TimedOut {
                operation,
                table: table.to_string(),
                waited_secs: waited.as_secs(),
            });
        }
        info!(operation, table, waited_secs = waited.as_secs(), "job still running");

        tokio::select! {
            _ = settings.cancel.cancelled() => {
                return Err(MigrationError::Cancelled { operation, table: table.to_string() });
            }
            _ = tokio::time::sleep(settings.interval) => {}
        }
    }
}

/// Public entry point for the bulk migration.
/// Exports the source table to S3 at a point in time and imports the export
/// into a new target table.
pub async fn run_migrate_flow(
    app_config: &AppConfig,
    operator: &dyn Operator,
    assume_yes: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let migrate_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Migrate(cfg)) => cfg,
        _ => anyhow::bail!("Migrate operation selected but no migrate configuration found."),
    };

    let table_name = complete_table_name(operator, &migrate_config.table_name, "")?;
    let secondary_indexes = match &migrate_config.secondary_indexes {
        Some(names) => names.clone(),
        None => {
            let answer = operator.input("Secondary indexes to add (separate indexes with comma):", "")?;
            parse_index_names(&answer.split(',').collect::<Vec<_>>())
        }
    };
    let (source_env, source_profile) = complete_selection(
        operator,
        "Source",
        &migrate_config.source,
        &app_config.environments,
        DEFAULT_SOURCE_PROFILE,
    )?;
    let (target_env, target_profile) = complete_selection(
        operator,
        "Target",
        &migrate_config.target,
        &app_config.environments,
        DEFAULT_TARGET_PROFILE,
    )?;

    let source_ref = app_config
        .environments
        .resolve(&table_name, &source_env, &source_profile)
        .context("Failed to resolve source table")?;
    let target_ref = app_config
        .environments
        .resolve(&table_name, &target_env, &target_profile)
        .context("Failed to resolve target table")?;

    let prefix = migrate_config
        .s3_prefix
        .clone()
        .unwrap_or_else(|| format!("ddb-export-{}", Utc::now().timestamp_millis()));

    operator.show(&format!(
        "Export {} to s3://{}/{} and import it into new table {} (indexes: {}).",
        source_ref.name,
        migrate_config.s3_bucket,
        prefix,
        target_ref.name,
        if secondary_indexes.is_empty() { "none".to_string() } else { secondary_indexes.join(", ") }
    ));
    if !assume_yes && !operator.confirm("Start export and import?")? {
        operator.show("No changes made.");
        return Ok(());
    }

    let poll = PollSettings {
        interval: migrate_config.poll_interval,
        max_wait: migrate_config.max_wait,
        cancel,
    };

    let source_sdk = load_sdk_config(&source_ref, &app_config.aws).await;
    let source_client = dynamodb::Client::new(&source_sdk);
    let table_arn = export::describe_table_arn(&source_client, &source_ref.name).await?;
    let exported = export::export_table(
        &source_client,
        &source_ref.name,
        &table_arn,
        &migrate_config.s3_bucket,
        &prefix,
        &poll,
    )
    .await?;
    println!("✅ Table {} exported successfully ({}).", source_ref.name, exported.export_arn);

    let data_prefix = match &exported.manifest_key {
        Some(manifest) => {
            let manifest_key = manifest::qualified_key(&prefix, manifest);
            manifest::verify_export_manifest(
                &source_sdk,
                source_ref.endpoint_url.is_some(),
                &migrate_config.s3_bucket,
                &manifest_key,
            )
            .await?;
            manifest::data_prefix(&manifest_key)
        }
        None => prefix.clone(),
    };

    let target_sdk = load_sdk_config(&target_ref, &app_config.aws).await;
    let target_client = dynamodb::Client::new(&target_sdk);
    let request = ImportRequest {
        target_table: target_ref.name.clone(),
        bucket: migrate_config.s3_bucket.clone(),
        key_prefix: data_prefix,
        partition_key: migrate_config.partition_key.clone(),
        sort_key: migrate_config.sort_key.clone(),
        secondary_indexes,
        read_capacity: migrate_config.read_capacity,
        write_capacity: migrate_config.write_capacity,
    };
    let import_arn = import::import_table(&target_client, &request, &poll).await?;
    println!("✅ Table {} imported successfully ({}).", target_ref.name, import_arn);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(max_wait: Duration) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(1),
            max_wait,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_wait_for_returns_when_done() {
        let counter = AtomicUsize::new(0);
        let polls = &counter;
        let value = wait_for("export", "ddb-production-menu", &settings(Duration::from_secs(5)), move || async move {
            match polls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Ok(JobStatus::Running),
                _ => Ok(JobStatus::Done("arn:export")),
            }
        })
        .await
        .expect("done");

        assert_eq!(value, "arn:export");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_for_reports_failed_status() {
        let err = wait_for("import", "ddb-local-menu", &settings(Duration::from_secs(5)), || async {
            Ok::<_, MigrationError>(JobStatus::<()>::Failed {
                status: "FAILED".to_string(),
                message: "bad input".to_string(),
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, MigrationError::Unsuccessful { ref status, .. } if status == "FAILED"));
        assert!(err.to_string().contains("bad input"));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let err = wait_for("export", "t", &settings(Duration::ZERO), || async {
            Ok::<_, MigrationError>(JobStatus::<()>::Running)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, MigrationError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_wait_for_stops_on_cancel() {
        let poll = PollSettings {
            interval: Duration::from_secs(60),
            max_wait: Duration::from_secs(600),
            cancel: CancellationToken::new(),
        };
        poll.cancel.cancel();
        let err = wait_for("import", "t", &poll, || async {
            Ok::<_, MigrationError>(JobStatus::<()>::Running)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, MigrationError::Cancelled { .. }));
    }
}
