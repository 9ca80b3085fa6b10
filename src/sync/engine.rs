// ddbsync/src/sync/engine.rs
use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::writer::{BatchWriter, group_count};
use super::{diff, scanner};
use crate::errors::{ScanError, SyncError};
use crate::operator::Operator;
use crate::table::render::render_records;
use crate::table::{Record, TableEndpoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    ScanningSource,
    ScanningTarget,
    Diffing,
    AwaitingConfirmation,
    Writing,
    Completed,
    Declined,
    Failed,
}

/// Component a failed run stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    SourceScan,
    TargetScan,
    Write,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncPhase::SourceScan => "source scan",
            SyncPhase::TargetScan => "target scan",
            SyncPhase::Write => "batch write",
        })
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed { written: usize, groups: usize },
    Declined { pending: usize },
    Failed { phase: SyncPhase, error: SyncError },
}

#[derive(Debug)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Every state the run passed through, starting at `Idle`.
    pub transitions: Vec<SyncState>,
}

impl SyncReport {
    pub fn final_state(&self) -> SyncState {
        self.transitions.last().copied().unwrap_or(SyncState::Idle)
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub identity_attribute: String,
    /// Show the difference and stop without prompting.
    pub dry_run: bool,
    /// Skip the confirmation prompt before writing.
    pub assume_yes: bool,
    /// Ask the operator whether to resume a scan that failed partway.
    pub offer_scan_resume: bool,
}

/// One source-to-target sync: scan both sides, diff, confirm, write.
pub struct SyncEngine<'a> {
    source: &'a dyn TableEndpoint,
    target: &'a dyn TableEndpoint,
    operator: &'a dyn Operator,
    writer: BatchWriter,
    options: SyncOptions,
    cancel: CancellationToken,
}

struct Transitions(Vec<SyncState>);

impl Transitions {
    fn enter(&mut self, state: SyncState) {
        debug!(from = ?self.0.last(), to = ?state, "sync state transition");
        self.0.push(state);
    }

    fn finish(mut self, state: SyncState, outcome: SyncOutcome) -> SyncReport {
        self.enter(state);
        SyncReport {
            outcome,
            transitions: self.0,
        }
    }
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn TableEndpoint,
        target: &'a dyn TableEndpoint,
        operator: &'a dyn Operator,
        writer: BatchWriter,
        options: SyncOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            operator,
            writer,
            options,
            cancel,
        }
    }

    pub async fn run(&self) -> SyncReport {
        let mut states = Transitions(vec![SyncState::Idle]);

        states.enter(SyncState::ScanningSource);
        let source_records = match self.scan_endpoint(self.source).await {
            Ok(records) => records,
            Err(err) => return self.fail(states, SyncPhase::SourceScan, err.into()),
        };

        states.enter(SyncState::ScanningTarget);
        let target_records = match self.scan_endpoint(self.target).await {
            Ok(records) => records,
            Err(err) => return self.fail(states, SyncPhase::TargetScan, err.into()),
        };

        states.enter(SyncState::Diffing);
        let identity = self.options.identity_attribute.as_str();
        let without_identity = diff::count_without_identity(&source_records, identity);
        if without_identity > 0 {
            warn!(
                count = without_identity,
                identity, "source records without an identity attribute only match target records without one"
            );
        }
        let pending = diff::diff(&source_records, &target_records, identity);
        drop(source_records);
        drop(target_records);

        if pending.is_empty() {
            self.operator.show(&format!(
                "Target table {} is already up to date; nothing to write.",
                self.target.table_name()
            ));
            return states.finish(SyncState::Completed, SyncOutcome::Completed { written: 0, groups: 0 });
        }

        states.enter(SyncState::AwaitingConfirmation);
        self.present(&pending);
        if self.options.dry_run {
            self.operator.show("Dry run only. No changes made.");
            return states.finish(SyncState::Declined, SyncOutcome::Declined { pending: pending.len() });
        }
        if !self.options.assume_yes && !self.ask("Copy above items?") {
            self.operator.show("No changes made.");
            return states.finish(SyncState::Declined, SyncOutcome::Declined { pending: pending.len() });
        }

        states.enter(SyncState::Writing);
        match self.writer.write(self.target, &pending, &self.cancel).await {
            Ok(report) => {
                self.operator.show(&format!(
                    "Sync completed successfully! {} items written to {} in {} batch(es).",
                    report.records_written,
                    self.target.table_name(),
                    report.groups_written
                ));
                states.finish(
                    SyncState::Completed,
                    SyncOutcome::Completed {
                        written: report.records_written,
                        groups: report.groups_written,
                    },
                )
            }
            Err(err) => self.fail(states, SyncPhase::Write, err.into()),
        }
    }

    fn present(&self, pending: &[Record]) {
        self.operator.show(&render_records(pending));
        self.operator.show(&format!(
            "Dry Run - {} items to be written to the target table {} in {} batch(es).",
            pending.len(),
            self.target.table_name(),
            group_count(pending.len(), self.writer.chunk_size())
        ));
    }

    /// A prompt that cannot be answered counts as a no.
    fn ask(&self, question: &str) -> bool {
        self.operator.confirm(question).unwrap_or_else(|err| {
            warn!(error = %err, "confirmation prompt failed; treating as no");
            false
        })
    }

    async fn scan_endpoint(&self, table: &dyn TableEndpoint) -> Result<Vec<Record>, ScanError> {
        let mut result = scanner::scan(table, &self.cancel).await;
        loop {
            let err = match result {
                Ok(records) => return Ok(records),
                Err(err) => err,
            };
            if !self.options.offer_scan_resume || !err.is_resumable() {
                return Err(err);
            }
            if !self.ask(&format!("{}. Resume scanning {}?", err, table.table_name())) {
                return Err(err);
            }
            let point = err.into_resume_point()?;
            result = scanner::resume(table, point, &self.cancel).await;
        }
    }

    fn fail(&self, states: Transitions, phase: SyncPhase, error: SyncError) -> SyncReport {
        let detail = match &error {
            SyncError::Scan(scan) => format!(
                "{} ({} records had been read from {})",
                scan,
                scan.partial().len(),
                self.table_for(phase)
            ),
            other => other.to_string(),
        };
        self.operator.show(&format!("❌ Sync failed during {}: {}", phase, detail));
        states.finish(SyncState::Failed, SyncOutcome::Failed { phase, error })
    }

    fn table_for(&self, phase: SyncPhase) -> &str {
        match phase {
            SyncPhase::SourceScan => self.source.table_name(),
            SyncPhase::TargetScan | SyncPhase::Write => self.target.table_name(),
        }
    }
}
