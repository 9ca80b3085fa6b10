// ddbsync/src/sync/scanner.rs
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{ResumePoint, ScanError};
use crate::table::{Record, ScanCursor, TableEndpoint};

/// Reads every record of `table`, following the scan cursor until the
/// provider stops returning one.
///
/// Cancellation is checked before each page request, never during one. A
/// failure after the first page keeps everything read so far in
/// [`ScanError::Aborted`] together with the cursor to continue from.
pub async fn scan(table: &dyn TableEndpoint, cancel: &CancellationToken) -> Result<Vec<Record>, ScanError> {
    scan_from(table, Vec::new(), None, 0, cancel).await
}

/// Continues an interrupted scan from where it stopped.
pub async fn resume(
    table: &dyn TableEndpoint,
    point: ResumePoint,
    cancel: &CancellationToken,
) -> Result<Vec<Record>, ScanError> {
    info!(
        table = table.table_name(),
        records = point.records.len(),
        pages = point.pages_read,
        "resuming scan"
    );
    scan_from(table, point.records, point.cursor, point.pages_read, cancel).await
}

async fn scan_from(
    table: &dyn TableEndpoint,
    mut records: Vec<Record>,
    mut cursor: Option<ScanCursor>,
    mut pages_read: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Record>, ScanError> {
    loop {
        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled {
                table: table.table_name().to_string(),
                partial: records,
                pages_read,
            });
        }

        let page = match table.scan_page(cursor.clone()).await {
            Ok(page) => page,
            Err(source) if pages_read == 0 && source.is_transient() => {
                return Err(ScanError::TransientRead {
                    table: table.table_name().to_string(),
                    source,
                });
            }
            Err(source) => {
                return Err(ScanError::Aborted {
                    table: table.table_name().to_string(),
                    partial: records,
                    resume_from: cursor,
                    pages_read,
                    source,
                });
            }
        };

        pages_read += 1;
        records.extend(page.records);
        debug!(
            table = table.table_name(),
            page = pages_read,
            total = records.len(),
            "scanned page"
        );

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(table = table.table_name(), records = records.len(), pages = pages_read, "scan complete");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::sync::testing::{MemoryTable, ids, records};
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_scan_reads_every_page() {
        let table = MemoryTable::new("source", 3).with_records(records(&["A", "B", "C", "D", "E", "F", "G"]));
        let scanned = scan(&table, &CancellationToken::new()).await.expect("scan");

        assert_eq!(ids(&scanned), vec!["A", "B", "C", "D", "E", "F", "G"]);
        assert_eq!(table.scan_calls(), 3);
    }

    #[tokio::test]
    async fn test_scan_identities_do_not_depend_on_page_size() {
        let all: Vec<String> = (0..53).map(|i| format!("item-{i}")).collect();
        let all: Vec<&str> = all.iter().map(String::as_str).collect();
        let expected: HashSet<String> = all.iter().map(|s| s.to_string()).collect();

        for page_size in [1, 7, 25, 53, 100] {
            let table = MemoryTable::new("source", page_size).with_records(records(&all));
            let scanned = scan(&table, &CancellationToken::new()).await.expect("scan");
            assert_eq!(scanned.len(), 53, "page size {page_size}");
            let got: HashSet<String> = ids(&scanned).into_iter().collect();
            assert_eq!(got, expected, "page size {page_size}");
        }
    }

    #[tokio::test]
    async fn test_scan_empty_table() {
        let table = MemoryTable::new("source", 10);
        let scanned = scan(&table, &CancellationToken::new()).await.expect("scan");
        assert!(scanned.is_empty());
        assert_eq!(table.scan_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_on_first_page() {
        let table = MemoryTable::new("source", 2)
            .with_records(records(&["A", "B", "C"]))
            .fail_scan_call(0, ProviderError::Transient("throttled".into()));

        let err = scan(&table, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::TransientRead { .. }), "{err:?}");
        assert!(err.partial().is_empty());
    }

    #[tokio::test]
    async fn test_later_page_failure_keeps_partial_and_resumes() {
        let table = MemoryTable::new("source", 2)
            .with_records(records(&["A", "B", "C", "D", "E"]))
            .fail_scan_call(1, ProviderError::Transient("timeout".into()));
        let cancel = CancellationToken::new();

        let err = scan(&table, &cancel).await.unwrap_err();
        match &err {
            ScanError::Aborted {
                partial,
                resume_from,
                pages_read,
                source,
                ..
            } => {
                assert_eq!(ids(partial), vec!["A", "B"]);
                assert!(resume_from.is_some());
                assert_eq!(*pages_read, 1);
                assert!(source.is_transient());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let point = err.into_resume_point().expect("resumable");
        let scanned = resume(&table, point, &cancel).await.expect("resume");
        assert_eq!(ids(&scanned), vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_rejected_first_page_is_aborted_not_transient() {
        let table = MemoryTable::new("source", 2)
            .with_records(records(&["A"]))
            .fail_scan_call(0, ProviderError::Rejected("no such table".into()));

        let err = scan(&table, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::Aborted { pages_read: 0, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_cancelled_scan_stops_before_next_page() {
        let table = MemoryTable::new("source", 1).with_records(records(&["A", "B"]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = scan(&table, &cancel).await.unwrap_err();
        assert!(matches!(err, ScanError::Cancelled { pages_read: 0, .. }));
        assert_eq!(table.scan_calls(), 0);
    }
}
