use std::fmt;

use thiserror::Error;

use crate::table::{Record, ScanCursor};

/// Failure reported by a table endpoint for a single scan or batch-write call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Throttling, timeouts, dispatch failures and server-side errors.
    #[error("transient provider error: {0}")]
    Transient(String),

    #[error("request rejected by provider: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Where an interrupted scan can be picked up again.
#[derive(Debug, Clone)]
pub struct ResumePoint {
    pub records: Vec<Record>,
    pub cursor: Option<ScanCursor>,
    pub pages_read: usize,
}

#[derive(Error, Debug)]
pub enum ScanError {
    /// The first page could not be read; nothing was accumulated.
    #[error("transient read error scanning {table}: {source}")]
    TransientRead {
        table: String,
        #[source]
        source: ProviderError,
    },

    #[error(
        "scan of {table} aborted after {pages_read} page(s) and {} record(s): {source}",
        .partial.len()
    )]
    Aborted {
        table: String,
        partial: Vec<Record>,
        resume_from: Option<ScanCursor>,
        pages_read: usize,
        #[source]
        source: ProviderError,
    },

    #[error(
        "scan of {table} cancelled after {pages_read} page(s) and {} record(s)",
        .partial.len()
    )]
    Cancelled {
        table: String,
        partial: Vec<Record>,
        pages_read: usize,
    },
}

impl ScanError {
    /// Records accumulated before the scan stopped.
    pub fn partial(&self) -> &[Record] {
        match self {
            ScanError::TransientRead { .. } => &[],
            ScanError::Aborted { partial, .. } | ScanError::Cancelled { partial, .. } => partial,
        }
    }

    pub fn is_resumable(&self) -> bool {
        !matches!(self, ScanError::Cancelled { .. })
    }

    /// Converts a provider-side failure into the point the scan can continue from.
    /// Cancellations are handed back unchanged.
    pub fn into_resume_point(self) -> Result<ResumePoint, ScanError> {
        match self {
            ScanError::TransientRead { .. } => Ok(ResumePoint {
                records: Vec::new(),
                cursor: None,
                pages_read: 0,
            }),
            ScanError::Aborted {
                partial,
                resume_from,
                pages_read,
                ..
            } => Ok(ResumePoint {
                records: partial,
                cursor: resume_from,
                pages_read,
            }),
            cancelled @ ScanError::Cancelled { .. } => Err(cancelled),
        }
    }
}

/// Why a batch-write group did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteFailure {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("cancelled before the group was sent")]
    Cancelled,
}

/// A write that stopped partway through its group sequence.
///
/// Groups `0..failed_group` are durably written; `failed_group` and every
/// later group were not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteError {
    pub table: String,
    pub failed_group: usize,
    pub total_groups: usize,
    pub records_written: usize,
    pub cause: WriteFailure,
}

impl BatchWriteError {
    pub fn completed_groups(&self) -> usize {
        self.failed_group
    }

    /// Human readable partial-completion boundary, e.g.
    /// "groups 0-2 of 5 written; group 3 failed".
    pub fn boundary(&self) -> String {
        let written = match self.completed_groups() {
            0 => format!("no groups of {} written", self.total_groups),
            1 => format!("group 0 of {} written", self.total_groups),
            n => format!("groups 0-{} of {} written", n - 1, self.total_groups),
        };
        format!("{}; group {} failed", written, self.failed_group)
    }
}

impl fmt::Display for BatchWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch write to {} stopped ({} records written): {}: {}",
            self.table,
            self.records_written,
            self.boundary(),
            self.cause
        )
    }
}

impl std::error::Error for BatchWriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Invalid or missing configuration, detected before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("identity attribute name must not be empty")]
    EmptyIdentityAttribute,

    #[error("unknown environment '{name}' (known environments: {known})")]
    UnknownEnvironment { name: String, known: String },

    #[error("profile must not be empty for environment '{0}'")]
    MissingProfile(String),

    #[error("chunk size {size} is outside the allowed range 1..={max}")]
    InvalidChunkSize { size: usize, max: usize },

    #[error("table name template '{0}' must contain the {{table}} placeholder")]
    InvalidTemplate(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures of the bulk export/import path.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("{operation} request for {table} failed: {message}")]
    Request {
        operation: &'static str,
        table: String,
        message: String,
    },

    #[error("{operation} for {table} finished with status {status}: {message}")]
    Unsuccessful {
        operation: &'static str,
        table: String,
        status: String,
        message: String,
    },

    #[error("{operation} for {table} did not finish within {waited_secs}s")]
    TimedOut {
        operation: &'static str,
        table: String,
        waited_secs: u64,
    },

    #[error("stopped waiting for {operation} of {table}; the job keeps running server-side")]
    Cancelled { operation: &'static str, table: String },

    #[error("export manifest s3://{bucket}/{key} is not readable: {message}")]
    ManifestMissing {
        bucket: String,
        key: String,
        message: String,
    },
}

/// Every failure a sync run can end with.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    BatchWrite(#[from] BatchWriteError),
}
