// ddbsync/src/config/mod.rs
mod environment;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigurationError;
use crate::sync::writer::{CHUNK_SIZE, validate_chunk_size};

pub use environment::{
    CredentialStrategy, EnvironmentProfile, EnvironmentTable, TableRef, load_sdk_config,
};

pub const DEFAULT_REGION: &str = "eu-west-1";
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:4566";
pub const DEFAULT_TABLE_NAME_TEMPLATE: &str = "ddb-{environment}-{table}";
pub const DEFAULT_IDENTITY_ATTRIBUTE: &str = "id";
/// Upper bound for `aws.unprocessed_retry_attempts`.
pub const MAX_UNPROCESSED_RETRY_ATTEMPTS: u32 = 10;

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonEndpointSelection {
    pub environment: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonEnvironment {
    #[serde(default)]
    pub use_local_endpoint: bool,
    pub credentials: CredentialStrategy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonAwsSettings {
    pub max_attempts: Option<u32>,
    pub operation_timeout_ms: Option<u64>,
    pub unprocessed_retry_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonMigrationOptions {
    pub s3_uri: Option<String>,
    pub partition_key: Option<String>,
    pub sort_key: Option<String>,
    pub secondary_indexes: Option<Vec<String>>,
    pub read_capacity: Option<i64>,
    pub write_capacity: Option<i64>,
    pub poll_interval_secs: Option<u64>,
    pub max_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub table_name: Option<String>,
    pub table_name_template: Option<String>,
    pub identity_attribute: Option<String>,
    pub chunk_size: Option<usize>,
    pub region: Option<String>,
    pub local_endpoint_url: Option<String>,
    pub source: Option<JsonEndpointSelection>,
    pub target: Option<JsonEndpointSelection>,
    pub environments: Option<BTreeMap<String, JsonEnvironment>>,
    pub aws: Option<JsonAwsSettings>,
    pub migration: Option<JsonMigrationOptions>,
}

// Application's internal configuration structs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSettings {
    pub max_attempts: u32,
    pub operation_timeout: Option<Duration>,
    pub unprocessed_retry_attempts: u32,
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            operation_timeout: None,
            unprocessed_retry_attempts: 5,
        }
    }
}

/// Source or target choice; gaps are filled in by prompting the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSelection {
    pub environment: Option<String>,
    pub profile: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub table_name: Option<String>,
    pub identity_attribute: String,
    pub chunk_size: usize,
    pub source: EndpointSelection,
    pub target: EndpointSelection,
}

#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub table_name: Option<String>,
    pub source: EndpointSelection,
    pub target: EndpointSelection,
    pub s3_bucket: String,
    pub s3_prefix: Option<String>,
    pub partition_key: String,
    pub sort_key: Option<String>,
    pub secondary_indexes: Option<Vec<String>>,
    pub read_capacity: i64,
    pub write_capacity: i64,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub operation: Option<OperationConfig>,
    pub environments: EnvironmentTable,
    pub aws: AwsSettings,
    pub raw_json_config: RawJsonConfig,
}

#[derive(Debug, Clone)]
pub enum OperationConfig {
    Sync(SyncConfig),
    Migrate(MigrateConfig),
}

impl AppConfig {
    /// Loads config.json; a missing file yields the built-in defaults.
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let raw_json_config: RawJsonConfig = if config_path.exists() {
            let config_content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
            serde_json::from_str(&config_content).with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?
        } else {
            println!(
                "No config file at {}; using defaults and interactive prompts.",
                config_path.display()
            );
            RawJsonConfig::default()
        };

        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw_json_config: RawJsonConfig) -> Result<Self> {
        let environments = EnvironmentTable::from_raw(&raw_json_config)
            .context("Invalid environments section in config.json")?;

        let raw_aws = raw_json_config.aws.clone().unwrap_or_default();
        let defaults = AwsSettings::default();
        let max_attempts = raw_aws.max_attempts.unwrap_or(defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigurationError::Invalid("aws.max_attempts must be at least 1".to_string()).into());
        }
        let unprocessed_retry_attempts = raw_aws
            .unprocessed_retry_attempts
            .unwrap_or(defaults.unprocessed_retry_attempts);
        if unprocessed_retry_attempts > MAX_UNPROCESSED_RETRY_ATTEMPTS {
            return Err(ConfigurationError::Invalid(format!(
                "aws.unprocessed_retry_attempts must be at most {}, got {}",
                MAX_UNPROCESSED_RETRY_ATTEMPTS, unprocessed_retry_attempts
            ))
            .into());
        }
        let aws = AwsSettings {
            max_attempts,
            operation_timeout: raw_aws.operation_timeout_ms.map(Duration::from_millis),
            unprocessed_retry_attempts,
        };

        Ok(AppConfig {
            operation: None, // To be filled by main after parsing CLI args
            environments,
            aws,
            raw_json_config,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn endpoint_selection(raw: &Option<JsonEndpointSelection>) -> EndpointSelection {
    let raw = raw.clone().unwrap_or_default();
    EndpointSelection {
        environment: non_empty(&raw.environment),
        profile: non_empty(&raw.profile),
    }
}

pub fn load_sync_config_from_json(raw_config: &RawJsonConfig) -> Result<SyncConfig> {
    let identity_attribute = match &raw_config.identity_attribute {
        Some(name) if name.trim().is_empty() => return Err(ConfigurationError::EmptyIdentityAttribute.into()),
        Some(name) => name.trim().to_string(),
        None => DEFAULT_IDENTITY_ATTRIBUTE.to_string(),
    };

    let chunk_size = raw_config.chunk_size.unwrap_or(CHUNK_SIZE);
    validate_chunk_size(chunk_size).context("chunk_size in config.json is invalid")?;

    Ok(SyncConfig {
        table_name: non_empty(&raw_config.table_name),
        identity_attribute,
        chunk_size,
        source: endpoint_selection(&raw_config.source),
        target: endpoint_selection(&raw_config.target),
    })
}

pub fn load_migrate_config_from_json(raw_config: &RawJsonConfig) -> Result<MigrateConfig> {
    let migration = raw_config
        .migration
        .as_ref()
        .context("migration must be defined in config.json for the migrate operation")?;

    let s3_uri = non_empty(&migration.s3_uri)
        .context("migration.s3_uri must be set in config.json for the migrate operation")?;
    let (s3_bucket, s3_prefix) = parse_s3_uri(&s3_uri)?;

    let partition_key = non_empty(&migration.partition_key).unwrap_or_else(|| "PK".to_string());
    // An explicit empty string means the table has no sort key.
    let sort_key = match &migration.sort_key {
        None => Some("SK".to_string()),
        Some(key) => non_empty(&Some(key.clone())),
    };

    let read_capacity = migration.read_capacity.unwrap_or(5);
    let write_capacity = migration.write_capacity.unwrap_or(5);
    if read_capacity < 1 || write_capacity < 1 {
        return Err(anyhow::anyhow!(
            "migration.read_capacity and migration.write_capacity must be positive in config.json."
        ));
    }

    let poll_interval = Duration::from_secs(migration.poll_interval_secs.unwrap_or(10).max(1));
    let max_wait = Duration::from_secs(migration.max_wait_secs.unwrap_or(3600));

    Ok(MigrateConfig {
        table_name: non_empty(&raw_config.table_name),
        source: endpoint_selection(&raw_config.source),
        target: endpoint_selection(&raw_config.target),
        s3_bucket,
        s3_prefix,
        partition_key,
        sort_key,
        secondary_indexes: migration.secondary_indexes.as_ref().map(|names| parse_index_names(names)),
        read_capacity,
        write_capacity,
        poll_interval,
        max_wait,
    })
}

/// Parses an S3 URI (s3://bucket[/prefix]) into bucket and optional key prefix.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, Option<String>)> {
    let uri = url::Url::parse(s3_uri)
        .with_context(|| format!("Invalid S3 URI format: {}", s3_uri))?;
    if uri.scheme() != "s3" {
        return Err(anyhow::anyhow!("S3 URI must start with s3://"));
    }
    let bucket = uri.host_str().context("S3 URI missing bucket name")?.to_string();
    let prefix = uri.path().trim_matches('/').to_string();
    Ok((bucket, if prefix.is_empty() { None } else { Some(prefix) }))
}

/// Trims index names and drops blanks, so "" and "a, ,b" both behave.
pub fn parse_index_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
