// ddbsync/src/table/dynamodb.rs
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb as dynamodb;
use dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use dynamodb::types::{PutRequest, WriteRequest};
use tracing::{debug, warn};

use super::{Record, ScanCursor, ScanPage, TableEndpoint};
use crate::config::{AwsSettings, TableRef, load_sdk_config};
use crate::errors::ProviderError;

const UNPROCESSED_BASE_DELAY: Duration = Duration::from_millis(100);
const UNPROCESSED_MAX_DELAY: Duration = Duration::from_secs(5);

/// Error codes DynamoDB uses for throttling and server-side trouble.
const TRANSIENT_ERROR_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "InternalServerError",
    "ServiceUnavailable",
];

/// A DynamoDB table reached through one set of credentials.
#[derive(Clone)]
pub struct DynamoDbTable {
    client: dynamodb::Client,
    table_name: String,
    unprocessed_retry_attempts: u32,
}

impl Debug for DynamoDbTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbTable")
            .field("table_name", &self.table_name)
            .field("unprocessed_retry_attempts", &self.unprocessed_retry_attempts)
            .finish()
    }
}

impl DynamoDbTable {
    pub async fn connect(table_ref: &TableRef, aws: &AwsSettings) -> Self {
        let sdk_config = load_sdk_config(table_ref, aws).await;
        Self::from_client(
            dynamodb::Client::new(&sdk_config),
            table_ref.name.clone(),
            aws.unprocessed_retry_attempts,
        )
    }

    pub fn from_client(client: dynamodb::Client, table_name: String, unprocessed_retry_attempts: u32) -> Self {
        Self {
            client,
            table_name,
            unprocessed_retry_attempts,
        }
    }
}

/// Sorts an SDK failure into transient (worth retrying later) or rejected.
pub(crate) fn classify<E, R>(err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: Debug,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => true,
        SdkError::ServiceError(service_err) => service_err
            .err()
            .code()
            .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code)),
        _ => false,
    };
    let message = DisplayErrorContext(&err).to_string();
    if transient {
        ProviderError::Transient(message)
    } else {
        ProviderError::Rejected(message)
    }
}

fn put_requests(records: &[Record]) -> Result<Vec<WriteRequest>, ProviderError> {
    records
        .iter()
        .map(|record| {
            let put = PutRequest::builder()
                .set_item(Some(record.clone()))
                .build()
                .map_err(|e| ProviderError::Rejected(format!("Failed to build put request: {}", e)))?;
            Ok(WriteRequest::builder().put_request(put).build())
        })
        .collect()
}

/// Exponential backoff before resubmission `attempt` (0-based), capped at
/// `UNPROCESSED_MAX_DELAY`.
fn resubmission_delay(attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| UNPROCESSED_BASE_DELAY.checked_mul(factor))
        .map_or(UNPROCESSED_MAX_DELAY, |delay| delay.min(UNPROCESSED_MAX_DELAY))
}

#[async_trait]
impl TableEndpoint for DynamoDbTable {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn scan_page(&self, cursor: Option<ScanCursor>) -> Result<ScanPage, ProviderError> {
        let response = self
            .client
            .scan()
            .table_name(&self.table_name)
            .set_exclusive_start_key(cursor.map(ScanCursor::into_key))
            .send()
            .await
            .map_err(classify)?;

        Ok(ScanPage {
            records: response.items().to_vec(),
            next_cursor: response.last_evaluated_key().cloned().and_then(ScanCursor::from_key),
        })
    }

    async fn batch_put(&self, records: &[Record]) -> Result<(), ProviderError> {
        let mut pending = put_requests(records)?;
        let mut resubmissions = 0u32;

        loop {
            let response = self
                .client
                .batch_write_item()
                .request_items(&self.table_name, pending)
                .send()
                .await
                .map_err(classify)?;

            let unprocessed = response
                .unprocessed_items()
                .and_then(|items| items.get(&self.table_name))
                .cloned()
                .unwrap_or_default();
            if unprocessed.is_empty() {
                debug!(table = %self.table_name, items = records.len(), resubmissions, "batch put accepted");
                return Ok(());
            }

            if resubmissions >= self.unprocessed_retry_attempts {
                return Err(ProviderError::Transient(format!(
                    "{} of {} items still unprocessed by {} after {} resubmission(s)",
                    unprocessed.len(),
                    records.len(),
                    self.table_name,
                    resubmissions
                )));
            }

            let delay = resubmission_delay(resubmissions);
            resubmissions += 1;
            warn!(
                table = %self.table_name,
                unprocessed = unprocessed.len(),
                attempt = resubmissions,
                delay_ms = delay.as_millis() as u64,
                "resubmitting unprocessed batch items"
            );
            tokio::time::sleep(delay).await;
            pending = unprocessed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;

    #[test]
    fn test_put_requests_wrap_every_record() {
        let records = vec![
            Record::from([("id".to_string(), AttributeValue::S("A".into()))]),
            Record::from([("id".to_string(), AttributeValue::S("C".into()))]),
        ];
        let requests = put_requests(&records).expect("requests");
        assert_eq!(requests.len(), 2);
        let first = requests[0].put_request().expect("put request");
        assert_eq!(first.item().get("id"), Some(&AttributeValue::S("A".into())));
    }

    #[test]
    fn test_resubmission_delay_doubles_then_caps() {
        assert_eq!(resubmission_delay(0), Duration::from_millis(100));
        assert_eq!(resubmission_delay(1), Duration::from_millis(200));
        assert_eq!(resubmission_delay(4), Duration::from_millis(1600));
        assert_eq!(resubmission_delay(6), UNPROCESSED_MAX_DELAY);
        assert_eq!(resubmission_delay(32), UNPROCESSED_MAX_DELAY);
        assert_eq!(resubmission_delay(u32::MAX), UNPROCESSED_MAX_DELAY);
    }
}
