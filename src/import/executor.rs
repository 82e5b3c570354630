//! Transactional application of records.
//!
//! A [`BatchExecutor`] owns one open transaction and the statements prepared
//! in it. Records are applied one at a time by binding them to the reusable
//! update statement. Row-level storage errors are soft: they are logged and
//! counted, and the batch carries on. A parameter binding error is returned
//! as a [`BindingFailure`] instead. Only the session decides between
//! [`commit`](BatchExecutor::commit) and [`roll_back`](BatchExecutor::roll_back).
//!
//! # States
//!
//! ```text
//! TransactionOpen -> Applying* -> Committing  -> Committed
//!                              -> RollingBack -> RolledBack
//! ```
//!
//! `Failed` is reached when the commit or rollback call itself fails.

use thiserror::Error;

use crate::import::parser::{Identifier, Record};
use crate::import::statements::Statements;
use crate::import::stats::{BatchCounters, BatchOutcome, BatchStatus, FatalReason, RollbackReason};
use crate::storage::{Param, Storage, StorageError, StorageTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    TransactionOpen,
    Applying,
    Committing,
    Committed,
    RollingBack,
    RolledBack,
    Failed,
}

/// A single record's update failed in storage.
#[derive(Debug, Error)]
#[error("failed to apply {identifier} at line {line}: {source}")]
pub struct RowExecutionError {
    pub line: usize,
    pub identifier: Identifier,
    #[source]
    pub source: StorageError,
}

/// Parameters could not be bound to a prepared statement.
#[derive(Debug, Error)]
#[error("binding parameters for {identifier} at line {line} failed: {source}")]
pub struct BindingFailure {
    pub line: usize,
    pub identifier: Identifier,
    #[source]
    pub source: StorageError,
}

/// What happened to one applied record.
#[derive(Debug)]
pub enum RowOutcome {
    /// The update touched `rows` rows.
    Applied { rows: u64, stock_id: Option<i64> },
    /// No product carries the identifier.
    NoMatch,
    /// Storage rejected the update; the batch continues.
    Failed(RowExecutionError),
}

/// Options controlling which statements an import runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Also resolve each record's stock-availability row.
    pub resolve_stock: bool,
}

struct Prepared<S> {
    update_quantity: S,
    lookup_stock: Option<S>,
}

/// Applies records inside a single transaction.
pub struct BatchExecutor<T: StorageTransaction> {
    tx: T,
    statements: Prepared<T::Statement>,
    counters: BatchCounters,
    state: ExecutorState,
}

impl<T: StorageTransaction> BatchExecutor<T> {
    /// Open a transaction and prepare the import statements.
    ///
    /// On failure nothing has been written; a transaction that was opened is
    /// rolled back before returning.
    pub fn begin<'s, S>(
        storage: &'s mut S,
        statements: &Statements,
        options: ImportOptions,
    ) -> Result<Self, FatalReason>
    where
        S: Storage<Transaction<'s> = T>,
    {
        let mut tx = storage.begin().map_err(FatalReason::BeginFailed)?;
        log::debug!("transaction open");

        match prepare(&mut tx, statements, options) {
            Ok(prepared) => Ok(Self {
                tx,
                statements: prepared,
                counters: BatchCounters::default(),
                state: ExecutorState::TransactionOpen,
            }),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("rollback after failed prepare also failed: {}", rollback_err);
                }
                Err(FatalReason::PrepareFailed(err))
            }
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn counters(&self) -> &BatchCounters {
        &self.counters
    }

    /// Bind `record` to the update statement and execute it.
    ///
    /// # Arguments
    /// * `line` - Input line the record came from, for diagnostics
    /// * `record` - Record to apply; consumed
    ///
    /// # Returns
    /// The per-row outcome. Storage errors are soft and come back as
    /// [`RowOutcome::Failed`]; a binding error is a [`BindingFailure`] and
    /// the batch must be rolled back.
    pub fn apply(&mut self, line: usize, record: Record) -> Result<RowOutcome, BindingFailure> {
        if self.state == ExecutorState::TransactionOpen {
            self.transition(ExecutorState::Applying);
        }

        self.counters.read += 1;

        let identifier = record.identifier().as_str();
        let params = [Param::Int(record.quantity()), Param::Text(identifier)];

        let rows = match self.tx.execute(&self.statements.update_quantity, &params) {
            Ok(rows) => rows,
            Err(source) if source.is_binding() => return Err(binding_failed(line, &record, source)),
            Err(source) => return Ok(self.row_failed(line, &record, source)),
        };
        self.counters.rows_affected += rows;

        if rows == 0 {
            self.counters.no_match += 1;
            log::warn!("line {}: no product matches {}", line, identifier);
            return Ok(RowOutcome::NoMatch);
        }

        self.counters.applied += 1;

        let lookup = match &self.statements.lookup_stock {
            Some(statement) => self.tx.fetch_id(statement, &[Param::Text(identifier)]),
            None => Ok(None),
        };
        let stock_id = match lookup {
            Ok(Some(stock_id)) => {
                self.counters.stock_resolved += 1;
                log::debug!(
                    "line {}: {} -> {} (stock {})",
                    line,
                    identifier,
                    record.quantity(),
                    stock_id
                );
                Some(stock_id)
            }
            Ok(None) => {
                log::debug!("line {}: {} -> {}", line, identifier, record.quantity());
                None
            }
            Err(source) if source.is_binding() => return Err(binding_failed(line, &record, source)),
            Err(source) => {
                // the update already went through, so only the lookup is counted
                self.counters.stock_lookup_failed += 1;
                log::error!(
                    "line {}: stock lookup for {} failed: {}",
                    line,
                    identifier,
                    source
                );
                None
            }
        };

        Ok(RowOutcome::Applied { rows, stock_id })
    }

    fn row_failed(&mut self, line: usize, record: &Record, source: StorageError) -> RowOutcome {
        self.counters.failed += 1;
        let err = RowExecutionError {
            line,
            identifier: record.identifier().clone(),
            source,
        };
        log::error!("{}", err);
        RowOutcome::Failed(err)
    }

    /// Commit everything applied so far.
    ///
    /// A failing commit leaves the server state unknown and is reported as
    /// [`FatalReason::CommitAmbiguous`].
    pub fn commit(mut self) -> BatchOutcome {
        self.transition(ExecutorState::Committing);
        let Self { tx, counters, .. } = self;

        match tx.commit() {
            Ok(()) => {
                log_transition(ExecutorState::Committing, ExecutorState::Committed);
                BatchOutcome::new(counters, BatchStatus::Committed)
            }
            Err(err) => {
                log_transition(ExecutorState::Committing, ExecutorState::Failed);
                BatchOutcome::fatal(counters, FatalReason::CommitAmbiguous(err))
            }
        }
    }

    /// Discard everything applied so far.
    pub fn roll_back(mut self, reason: RollbackReason) -> BatchOutcome {
        self.transition(ExecutorState::RollingBack);
        let Self { tx, counters, .. } = self;

        match tx.rollback() {
            Ok(()) => {
                log_transition(ExecutorState::RollingBack, ExecutorState::RolledBack);
                BatchOutcome::new(counters, BatchStatus::RolledBack(reason))
            }
            Err(error) => {
                log_transition(ExecutorState::RollingBack, ExecutorState::Failed);
                BatchOutcome::fatal(counters, FatalReason::RollbackFailed { reason, error })
            }
        }
    }

    fn transition(&mut self, next: ExecutorState) {
        log_transition(self.state, next);
        self.state = next;
    }
}

fn binding_failed(line: usize, record: &Record, source: StorageError) -> BindingFailure {
    BindingFailure {
        line,
        identifier: record.identifier().clone(),
        source,
    }
}

fn log_transition(from: ExecutorState, to: ExecutorState) {
    log::debug!("executor {:?} -> {:?}", from, to);
}

fn prepare<T: StorageTransaction>(
    tx: &mut T,
    statements: &Statements,
    options: ImportOptions,
) -> Result<Prepared<T::Statement>, StorageError> {
    let update_quantity = tx.prepare(&statements.update_quantity)?;
    let lookup_stock = if options.resolve_stock {
        Some(tx.prepare(&statements.lookup_stock)?)
    } else {
        None
    };

    Ok(Prepared {
        update_quantity,
        lookup_stock,
    })
}
