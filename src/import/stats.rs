//! Import statistics and final outcome.
//!
//! Counters accumulate while the batch executor applies records; the
//! [`BatchOutcome`] pairs them with the terminal [`BatchStatus`] and is built
//! exactly once, when the session ends.

use serde::Serialize;
use thiserror::Error;

use crate::error::ImportError;
use crate::import::executor::BindingFailure;
use crate::import::input::{ParseFailure, SourceUnavailable};
use crate::storage::StorageError;

/// Per-row counters for a single import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    /// Records parsed from the input and handed to the executor
    pub read: usize,
    /// Records whose update touched at least one row
    pub applied: usize,
    /// Records whose update matched no product
    pub no_match: usize,
    /// Records whose update failed at the storage layer
    pub failed: usize,
    /// Records with a resolved stock-availability row (lookup enabled only)
    pub stock_resolved: usize,
    /// Applied records whose stock-availability lookup failed
    pub stock_lookup_failed: usize,
    /// Sum of affected-row counts reported by the storage layer
    pub rows_affected: u64,
}

impl BatchCounters {
    /// Records that reached storage without a row error.
    pub fn executed(&self) -> usize {
        self.applied + self.no_match
    }
}

/// Why a batch was rolled back.
#[derive(Debug, Error)]
pub enum RollbackReason {
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error(transparent)]
    Binding(#[from] BindingFailure),
}

impl RollbackReason {
    /// Input line the rollback points at.
    pub fn line(&self) -> Option<usize> {
        match self {
            RollbackReason::Parse(failure) => Some(failure.line),
            RollbackReason::Binding(failure) => Some(failure.line),
        }
    }
}

/// Conditions that end an import without a clean commit or rollback.
#[derive(Debug, Error)]
pub enum FatalReason {
    #[error(transparent)]
    SourceUnavailable(#[from] SourceUnavailable),
    #[error("could not open transaction: {0}")]
    BeginFailed(#[source] StorageError),
    #[error("could not prepare statement: {0}")]
    PrepareFailed(#[source] StorageError),
    #[error("commit failed, uncommitted work in unknown state: {0}")]
    CommitAmbiguous(#[source] StorageError),
    #[error("rollback after `{reason}` failed: {error}")]
    RollbackFailed {
        reason: RollbackReason,
        #[source]
        error: StorageError,
    },
}

impl FatalReason {
    pub fn line(&self) -> Option<usize> {
        match self {
            FatalReason::RollbackFailed { reason, .. } => reason.line(),
            _ => None,
        }
    }
}

/// Terminal state of an import.
#[derive(Debug)]
pub enum BatchStatus {
    Committed,
    RolledBack(RollbackReason),
    Fatal(FatalReason),
}

impl BatchStatus {
    fn label(&self) -> &'static str {
        match self {
            BatchStatus::Committed => "committed",
            BatchStatus::RolledBack(_) => "rolled_back",
            BatchStatus::Fatal(_) => "fatal",
        }
    }
}

/// Final result of an import: counters plus how the batch ended.
#[derive(Debug)]
pub struct BatchOutcome {
    counters: BatchCounters,
    status: BatchStatus,
}

impl BatchOutcome {
    pub(crate) fn new(counters: BatchCounters, status: BatchStatus) -> Self {
        match &status {
            BatchStatus::Committed => log::info!(
                "batch committed: {} read, {} applied, {} without match, {} failed",
                counters.read,
                counters.applied,
                counters.no_match,
                counters.failed
            ),
            BatchStatus::RolledBack(reason) => log::error!("batch rolled back: {}", reason),
            BatchStatus::Fatal(reason) => log::error!("batch aborted: {}", reason),
        }
        Self { counters, status }
    }

    pub(crate) fn fatal(counters: BatchCounters, reason: impl Into<FatalReason>) -> Self {
        Self::new(counters, BatchStatus::Fatal(reason.into()))
    }

    pub fn counters(&self) -> &BatchCounters {
        &self.counters
    }

    pub fn status(&self) -> &BatchStatus {
        &self.status
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.status, BatchStatus::Committed)
    }

    /// Input line associated with a rollback or fatal outcome, if any.
    pub fn failed_line(&self) -> Option<usize> {
        match &self.status {
            BatchStatus::Committed => None,
            BatchStatus::RolledBack(reason) => reason.line(),
            BatchStatus::Fatal(reason) => reason.line(),
        }
    }

    pub fn into_parts(self) -> (BatchCounters, BatchStatus) {
        (self.counters, self.status)
    }

    /// Counters on commit, the failure otherwise.
    pub fn into_result(self) -> Result<BatchCounters, ImportError> {
        match self.status {
            BatchStatus::Committed => Ok(self.counters),
            BatchStatus::RolledBack(reason) => Err(ImportError::RolledBack(reason)),
            BatchStatus::Fatal(reason) => Err(ImportError::Fatal(reason)),
        }
    }

    /// Serializable view for machine-readable summaries.
    pub fn summary(&self) -> OutcomeSummary {
        let reason = match &self.status {
            BatchStatus::Committed => None,
            BatchStatus::RolledBack(reason) => Some(reason.to_string()),
            BatchStatus::Fatal(reason) => Some(reason.to_string()),
        };

        OutcomeSummary {
            status: self.status.label(),
            reason,
            line: self.failed_line(),
            counters: self.counters,
        }
    }
}

/// JSON shape of a finished import.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub counters: BatchCounters,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::parser::ParseErrorKind;

    #[test]
    fn test_executed_counts_applied_and_no_match() {
        let counters = BatchCounters {
            read: 5,
            applied: 3,
            no_match: 1,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(counters.executed(), 4);
    }

    #[test]
    fn test_rollback_summary_reports_line() {
        let failure = ParseFailure {
            line: 3,
            kind: ParseErrorKind::Malformed,
        };
        let outcome = BatchOutcome::new(
            BatchCounters {
                read: 2,
                ..Default::default()
            },
            BatchStatus::RolledBack(failure.into()),
        );

        assert!(!outcome.is_committed());
        assert_eq!(outcome.failed_line(), Some(3));

        let json = serde_json::to_value(outcome.summary()).unwrap();
        assert_eq!(json["status"], "rolled_back");
        assert_eq!(json["line"], 3);
        assert_eq!(json["counters"]["read"], 2);
    }

    #[test]
    fn test_committed_summary_omits_reason() {
        let outcome = BatchOutcome::new(BatchCounters::default(), BatchStatus::Committed);
        let json = serde_json::to_value(outcome.summary()).unwrap();
        assert_eq!(json["status"], "committed");
        assert!(json.get("reason").is_none());
        assert!(json.get("line").is_none());
    }
}
