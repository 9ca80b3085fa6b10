// ddbsync/src/migrate/import.rs
use aws_sdk_dynamodb as dynamodb;
use dynamodb::error::{BuildError, DisplayErrorContext};
use dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, ImportStatus, InputFormat, KeySchemaElement,
    KeyType, Projection, ProjectionType, ProvisionedThroughput, S3BucketSource, ScalarAttributeType,
    TableCreationParameters,
};
use tracing::info;
use uuid::Uuid;

use super::{JobStatus, PollSettings, wait_for};
use crate::errors::MigrationError;

const IMPORT: &str = "ImportTable";

/// Everything needed to create the target table from an export.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub target_table: String,
    pub bucket: String,
    pub key_prefix: String,
    pub partition_key: String,
    pub sort_key: Option<String>,
    /// Each name `X` becomes index `X` keyed on `XPK` (hash) and `XSK` (range).
    pub secondary_indexes: Vec<String>,
    pub read_capacity: i64,
    pub write_capacity: i64,
}

fn key_element(name: &str, key_type: KeyType) -> Result<KeySchemaElement, BuildError> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(key_type)
        .build()
}

/// Appends a string attribute definition unless the name is already defined.
fn define_attribute(definitions: &mut Vec<AttributeDefinition>, name: &str) -> Result<(), BuildError> {
    if definitions.iter().any(|d| d.attribute_name() == name) {
        return Ok(());
    }
    definitions.push(
        AttributeDefinition::builder()
            .attribute_name(name)
            .attribute_type(ScalarAttributeType::S)
            .build()?,
    );
    Ok(())
}

fn throughput(request: &ImportRequest) -> Result<ProvisionedThroughput, BuildError> {
    ProvisionedThroughput::builder()
        .read_capacity_units(request.read_capacity)
        .write_capacity_units(request.write_capacity)
        .build()
}

pub fn table_creation_parameters(request: &ImportRequest) -> Result<TableCreationParameters, BuildError> {
    let mut definitions = Vec::new();
    let mut key_schema = vec![key_element(&request.partition_key, KeyType::Hash)?];
    define_attribute(&mut definitions, &request.partition_key)?;
    if let Some(sort_key) = &request.sort_key {
        key_schema.push(key_element(sort_key, KeyType::Range)?);
        define_attribute(&mut definitions, sort_key)?;
    }

    let mut indexes = Vec::with_capacity(request.secondary_indexes.len());
    for name in &request.secondary_indexes {
        let hash = format!("{name}PK");
        let range = format!("{name}SK");
        define_attribute(&mut definitions, &hash)?;
        define_attribute(&mut definitions, &range)?;
        indexes.push(
            GlobalSecondaryIndex::builder()
                .index_name(name)
                .key_schema(key_element(&hash, KeyType::Hash)?)
                .key_schema(key_element(&range, KeyType::Range)?)
                .projection(Projection::builder().projection_type(ProjectionType::All).build())
                .provisioned_throughput(throughput(request)?)
                .build()?,
        );
    }

    TableCreationParameters::builder()
        .table_name(&request.target_table)
        .set_attribute_definitions(Some(definitions))
        .set_key_schema(Some(key_schema))
        .billing_mode(BillingMode::Provisioned)
        .provisioned_throughput(throughput(request)?)
        .set_global_secondary_indexes(if indexes.is_empty() { None } else { Some(indexes) })
        .build()
}

fn request_error(operation: &'static str, table: &str, message: String) -> MigrationError {
    MigrationError::Request {
        operation,
        table: table.to_string(),
        message,
    }
}

/// Imports the export under `request.key_prefix` into a new table and waits
/// for the import to finish. Returns the import ARN.
pub async fn import_table(
    client: &dynamodb::Client,
    request: &ImportRequest,
    poll: &PollSettings,
) -> Result<String, MigrationError> {
    let table = request.target_table.as_str();
    let parameters =
        table_creation_parameters(request).map_err(|e| request_error(IMPORT, table, e.to_string()))?;
    let source = S3BucketSource::builder()
        .s3_bucket(&request.bucket)
        .s3_key_prefix(&request.key_prefix)
        .build()
        .map_err(|e| request_error(IMPORT, table, e.to_string()))?;

    let output = client
        .import_table()
        .s3_bucket_source(source)
        .input_format(InputFormat::DynamodbJson)
        .table_creation_parameters(parameters)
        .client_token(Uuid::new_v4().to_string())
        .send()
        .await
        .map_err(|e| request_error(IMPORT, table, DisplayErrorContext(e).to_string()))?;

    let import_arn = output
        .import_table_description()
        .and_then(|description| description.import_arn())
        .map(str::to_string)
        .ok_or_else(|| request_error(IMPORT, table, "response did not include an import ARN".to_string()))?;
    info!(table, import_arn = %import_arn, bucket = %request.bucket, prefix = %request.key_prefix, "import started");

    let arn = import_arn.as_str();
    wait_for(IMPORT, table, poll, move || async move { import_status(client, arn, table).await }).await?;
    Ok(import_arn)
}

async fn import_status(
    client: &dynamodb::Client,
    import_arn: &str,
    table: &str,
) -> Result<JobStatus<()>, MigrationError> {
    let output = client
        .describe_import()
        .import_arn(import_arn)
        .send()
        .await
        .map_err(|e| request_error("DescribeImport", table, DisplayErrorContext(e).to_string()))?;

    let Some(description) = output.import_table_description() else {
        return Ok(JobStatus::Running);
    };
    Ok(match description.import_status() {
        Some(ImportStatus::Completed) => JobStatus::Done(()),
        Some(status @ (ImportStatus::Failed | ImportStatus::Cancelled)) => JobStatus::Failed {
            status: status.as_str().to_string(),
            message: description
                .failure_message()
                .unwrap_or("no failure message")
                .to_string(),
        },
        _ => JobStatus::Running,
    })
}
