// ddbsync/src/config/environment.rs
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::config::Credentials;
use aws_smithy_types::retry::RetryConfig;
use aws_smithy_types::timeout::TimeoutConfig;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    AwsSettings, DEFAULT_LOCAL_ENDPOINT, DEFAULT_REGION, DEFAULT_TABLE_NAME_TEMPLATE, RawJsonConfig,
};
use crate::errors::ConfigurationError;

/// How credentials are obtained for an environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialStrategy {
    /// Named profile from the shared config/credentials files.
    SharedProfile,
    /// Named profile backed by an SSO session (`aws sso login --profile ...`).
    Sso,
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    /// Environment variables, instance metadata and the rest of the SDK chain.
    DefaultChain,
}

impl CredentialStrategy {
    fn needs_profile(&self) -> bool {
        matches!(self, CredentialStrategy::SharedProfile | CredentialStrategy::Sso)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentProfile {
    pub use_local_endpoint: bool,
    pub credentials: CredentialStrategy,
}

/// Environment name to connection settings, plus the naming rules shared by
/// every environment.
#[derive(Debug, Clone)]
pub struct EnvironmentTable {
    entries: Vec<(String, EnvironmentProfile)>,
    region: String,
    local_endpoint_url: String,
    table_name_template: String,
}

/// A fully resolved table on one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub environment: String,
    pub profile: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub credentials: CredentialStrategy,
}

impl TableRef {
    /// True when both refs certainly address one physical table: same name
    /// and endpoint, reached through the same environment and profile.
    /// Different environments or profiles may be different accounts.
    pub fn same_table_as(&self, other: &TableRef) -> bool {
        self.name == other.name
            && self.endpoint_url == other.endpoint_url
            && self.region == other.region
            && self.environment == other.environment
            && self.profile == other.profile
    }
}

fn builtin_entries() -> Vec<(String, EnvironmentProfile)> {
    let profile = |use_local_endpoint, credentials| EnvironmentProfile {
        use_local_endpoint,
        credentials,
    };
    vec![
        ("local".to_string(), profile(true, CredentialStrategy::SharedProfile)),
        ("kimchi".to_string(), profile(false, CredentialStrategy::Sso)),
        ("staging".to_string(), profile(false, CredentialStrategy::Sso)),
        ("production".to_string(), profile(false, CredentialStrategy::SharedProfile)),
    ]
}

impl EnvironmentTable {
    pub fn from_raw(raw: &RawJsonConfig) -> Result<Self, ConfigurationError> {
        let entries = match &raw.environments {
            Some(environments) if environments.is_empty() => {
                return Err(ConfigurationError::Invalid(
                    "environments must list at least one environment".to_string(),
                ));
            }
            Some(environments) => environments
                .iter()
                .map(|(name, env)| {
                    (
                        name.clone(),
                        EnvironmentProfile {
                            use_local_endpoint: env.use_local_endpoint,
                            credentials: env.credentials.clone(),
                        },
                    )
                })
                .collect(),
            None => builtin_entries(),
        };

        let table_name_template = raw
            .table_name_template
            .clone()
            .unwrap_or_else(|| DEFAULT_TABLE_NAME_TEMPLATE.to_string());
        if !table_name_template.contains("{table}") {
            return Err(ConfigurationError::InvalidTemplate(table_name_template));
        }

        Ok(Self {
            entries,
            region: raw.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string()),
            local_endpoint_url: raw
                .local_endpoint_url
                .clone()
                .unwrap_or_else(|| DEFAULT_LOCAL_ENDPOINT.to_string()),
            table_name_template,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// "local" when it exists, otherwise the first configured environment.
    pub fn default_environment(&self) -> &str {
        self.entries
            .iter()
            .map(|(name, _)| name.as_str())
            .find(|name| *name == "local")
            .or_else(|| self.entries.first().map(|(name, _)| name.as_str()))
            .unwrap_or("local")
    }

    pub fn get(&self, environment: &str) -> Option<&EnvironmentProfile> {
        self.entries
            .iter()
            .find(|(name, _)| name == environment)
            .map(|(_, profile)| profile)
    }

    pub fn table_name(&self, environment: &str, table: &str) -> String {
        self.table_name_template
            .replace("{environment}", environment)
            .replace("{table}", table)
    }

    pub fn resolve(&self, table: &str, environment: &str, profile: &str) -> Result<TableRef, ConfigurationError> {
        let table = table.trim();
        if table.is_empty() {
            return Err(ConfigurationError::EmptyTableName);
        }
        let settings = self
            .get(environment)
            .ok_or_else(|| ConfigurationError::UnknownEnvironment {
                name: environment.to_string(),
                known: self.names().join(", "),
            })?;
        let profile = profile.trim();
        if profile.is_empty() && settings.credentials.needs_profile() {
            return Err(ConfigurationError::MissingProfile(environment.to_string()));
        }

        Ok(TableRef {
            name: self.table_name(environment, table),
            environment: environment.to_string(),
            profile: profile.to_string(),
            region: self.region.clone(),
            endpoint_url: settings
                .use_local_endpoint
                .then(|| self.local_endpoint_url.clone()),
            credentials: settings.credentials.clone(),
        })
    }
}

/// Builds the SDK configuration for one endpoint.
pub async fn load_sdk_config(table_ref: &TableRef, aws: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(table_ref.region.clone()))
        .retry_config(RetryConfig::standard().with_max_attempts(aws.max_attempts));

    if let Some(timeout) = aws.operation_timeout {
        loader = loader.timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
    }

    if let Some(endpoint) = &table_ref.endpoint_url {
        debug!(environment = %table_ref.environment, endpoint = %endpoint, "using local endpoint override");
        loader = loader.endpoint_url(endpoint);
    }

    loader = match &table_ref.credentials {
        CredentialStrategy::SharedProfile => loader.profile_name(&table_ref.profile),
        CredentialStrategy::Sso => {
            info!(
                profile = %table_ref.profile,
                "using SSO profile; run `aws sso login --profile {}` if the session has expired",
                table_ref.profile
            );
            loader.profile_name(&table_ref.profile)
        }
        CredentialStrategy::Static {
            access_key_id,
            secret_access_key,
        } => loader.credentials_provider(Credentials::new(
            access_key_id,
            secret_access_key,
            None,     // session_token
            None,     // expiry
            "Static", // provider_name
        )),
        CredentialStrategy::DefaultChain => loader,
    };

    loader.load().await
}
