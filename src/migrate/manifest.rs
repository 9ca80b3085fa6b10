// ddbsync/src/migrate/manifest.rs
use aws_config::SdkConfig;
use aws_sdk_s3 as s3;
use s3::error::DisplayErrorContext;
use tracing::debug;

use crate::errors::MigrationError;

/// Export manifests may be reported relative to the export prefix; this
/// returns the full object key either way.
pub fn qualified_key(prefix: &str, manifest: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let manifest = manifest.trim_start_matches('/');
    if prefix.is_empty() || manifest.starts_with(&format!("{}/", prefix)) {
        manifest.to_string()
    } else {
        format!("{}/{}", prefix, manifest)
    }
}

/// Key prefix of the exported data files, which sit in `data/` next to the
/// manifest.
pub fn data_prefix(manifest_key: &str) -> String {
    match manifest_key.rsplit_once('/') {
        Some((directory, _)) => format!("{}/data/", directory),
        None => "data/".to_string(),
    }
}

/// Confirms the export manifest exists before an import is started from it.
pub async fn verify_export_manifest(
    sdk_config: &SdkConfig,
    local_endpoint: bool,
    bucket: &str,
    key: &str,
) -> Result<(), MigrationError> {
    // Emulators serve buckets by path, not by virtual host.
    let s3_config = s3::config::Builder::from(sdk_config)
        .force_path_style(local_endpoint)
        .build();
    let client = s3::Client::from_conf(s3_config);

    let head = client
        .head_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| MigrationError::ManifestMissing {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: DisplayErrorContext(e).to_string(),
        })?;

    debug!(bucket, key, size = head.content_length().unwrap_or_default(), "export manifest found");
    println!("✓ Export manifest s3://{}/{} is in place.", bucket, key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_key() {
        assert_eq!(
            qualified_key("ddb-export-1", "AWSDynamoDB/0001-abc/manifest-files.json"),
            "ddb-export-1/AWSDynamoDB/0001-abc/manifest-files.json"
        );
        assert_eq!(
            qualified_key("ddb-export-1/", "ddb-export-1/AWSDynamoDB/0001-abc/manifest-files.json"),
            "ddb-export-1/AWSDynamoDB/0001-abc/manifest-files.json"
        );
        assert_eq!(qualified_key("", "/AWSDynamoDB/x/manifest-files.json"), "AWSDynamoDB/x/manifest-files.json");
    }

    #[test]
    fn test_data_prefix_sits_next_to_manifest() {
        assert_eq!(
            data_prefix("ddb-export-1/AWSDynamoDB/0001-abc/manifest-files.json"),
            "ddb-export-1/AWSDynamoDB/0001-abc/data/"
        );
        assert_eq!(data_prefix("manifest-files.json"), "data/");
    }
}
