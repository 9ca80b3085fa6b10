// ddbsync/src/migrate/export.rs
use aws_sdk_dynamodb as dynamodb;
use dynamodb::error::DisplayErrorContext;
use dynamodb::types::{ExportFormat, ExportStatus};
use tracing::info;
use uuid::Uuid;

use super::{JobStatus, PollSettings, wait_for};
use crate::errors::MigrationError;

const EXPORT: &str = "ExportTableToPointInTime";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedTable {
    pub export_arn: String,
    /// Manifest object key reported by the export, when present.
    pub manifest_key: Option<String>,
}

fn request_error(operation: &'static str, table: &str, err: impl std::error::Error) -> MigrationError {
    MigrationError::Request {
        operation,
        table: table.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

/// Looks up the table ARN the export API needs.
pub async fn describe_table_arn(client: &dynamodb::Client, table: &str) -> Result<String, MigrationError> {
    let output = client
        .describe_table()
        .table_name(table)
        .send()
        .await
        .map_err(|e| request_error("DescribeTable", table, e))?;

    output
        .table()
        .and_then(|description| description.table_arn())
        .map(str::to_string)
        .ok_or_else(|| MigrationError::Request {
            operation: "DescribeTable",
            table: table.to_string(),
            message: "response did not include a table ARN".to_string(),
        })
}

/// Starts a point-in-time export of `table` to `s3://bucket/prefix` and waits
/// for it to complete.
pub async fn export_table(
    client: &dynamodb::Client,
    table: &str,
    table_arn: &str,
    bucket: &str,
    prefix: &str,
    poll: &PollSettings,
) -> Result<ExportedTable, MigrationError> {
    let output = client
        .export_table_to_point_in_time()
        .table_arn(table_arn)
        .s3_bucket(bucket)
        .s3_prefix(prefix)
        .export_format(ExportFormat::DynamodbJson)
        .client_token(Uuid::new_v4().to_string())
        .send()
        .await
        .map_err(|e| request_error(EXPORT, table, e))?;

    let export_arn = output
        .export_description()
        .and_then(|description| description.export_arn())
        .map(str::to_string)
        .ok_or_else(|| MigrationError::Request {
            operation: EXPORT,
            table: table.to_string(),
            message: "response did not include an export ARN".to_string(),
        })?;
    info!(table, export_arn = %export_arn, bucket, prefix, "export started");

    let arn = export_arn.as_str();
    wait_for(EXPORT, table, poll, move || async move {
        export_status(client, arn, table).await
    })
    .await
}

async fn export_status(
    client: &dynamodb::Client,
    export_arn: &str,
    table: &str,
) -> Result<JobStatus<ExportedTable>, MigrationError> {
    let output = client
        .describe_export()
        .export_arn(export_arn)
        .send()
        .await
        .map_err(|e| request_error("DescribeExport", table, e))?;

    let Some(description) = output.export_description() else {
        return Ok(JobStatus::Running);
    };
    Ok(match description.export_status() {
        Some(ExportStatus::Completed) => JobStatus::Done(ExportedTable {
            export_arn: export_arn.to_string(),
            manifest_key: description.export_manifest().map(str::to_string),
        }),
        Some(ExportStatus::Failed) => JobStatus::Failed {
            status: ExportStatus::Failed.as_str().to_string(),
            message: description
                .failure_message()
                .unwrap_or("no failure message")
                .to_string(),
        },
        _ => JobStatus::Running,
    })
}
