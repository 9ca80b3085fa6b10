// ddbsync/src/sync/writer.rs
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{BatchWriteError, ConfigurationError, WriteFailure};
use crate::table::{Record, TableEndpoint};

/// Maximum number of put requests DynamoDB accepts in one BatchWriteItem call.
pub const CHUNK_SIZE: usize = 25;

pub fn validate_chunk_size(size: usize) -> Result<(), ConfigurationError> {
    if (1..=CHUNK_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidChunkSize { size, max: CHUNK_SIZE })
    }
}

/// Number of write calls needed for `records` items.
pub fn group_count(records: usize, chunk_size: usize) -> usize {
    records.div_ceil(chunk_size)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub groups_written: usize,
    pub records_written: usize,
}

/// Writes records in consecutive groups, one provider call per group.
#[derive(Debug, Clone, Copy)]
pub struct BatchWriter {
    chunk_size: usize,
}

impl BatchWriter {
    pub fn new(chunk_size: usize) -> Result<Self, ConfigurationError> {
        validate_chunk_size(chunk_size)?;
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Puts every record into `table`, group by group.
    ///
    /// Each group waits for the previous one to finish. The first failing
    /// group stops the write: earlier groups stay written, later groups are
    /// never sent.
    pub async fn write(
        &self,
        table: &dyn TableEndpoint,
        records: &[Record],
        cancel: &CancellationToken,
    ) -> Result<WriteReport, BatchWriteError> {
        let total_groups = group_count(records.len(), self.chunk_size);
        let mut report = WriteReport {
            groups_written: 0,
            records_written: 0,
        };

        for (index, group) in records.chunks(self.chunk_size).enumerate() {
            let failure = |cause: WriteFailure| BatchWriteError {
                table: table.table_name().to_string(),
                failed_group: index,
                total_groups,
                records_written: report.records_written,
                cause,
            };

            if cancel.is_cancelled() {
                return Err(failure(WriteFailure::Cancelled));
            }
            if let Err(err) = table.batch_put(group).await {
                return Err(failure(WriteFailure::Provider(err)));
            }

            report.groups_written += 1;
            report.records_written += group.len();
            debug!(
                table = table.table_name(),
                group = index,
                total_groups,
                items = group.len(),
                "batch group written"
            );
        }

        info!(
            table = table.table_name(),
            groups = report.groups_written,
            records = report.records_written,
            "batch write complete"
        );
        Ok(report)
    }
}
