//! Storage collaborator interface.
//!
//! The import core only needs a handful of operations from the database:
//! open a transaction, prepare a statement once, execute it many times with
//! fresh parameters, then commit or roll back. [`Storage`] and
//! [`StorageTransaction`] capture exactly that so the batch logic can run
//! against MySQL ([`crate::db::MySqlStore`]) or the in-memory stub in
//! [`crate::test_support`].
//!
//! All calls are blocking.

use thiserror::Error;

/// Which of the import statements a [`QueryText`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Set the quantity of the product matching an identifier.
    UpdateQuantity,
    /// Resolve the stock-availability row id for an identifier.
    LookupStock,
}

/// SQL text for one statement, tagged with what it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryText {
    pub kind: StatementKind,
    pub sql: String,
}

/// A single positional statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param<'a> {
    Text(&'a str),
    Int(i32),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("begin transaction failed: {0}")]
    Begin(#[source] sqlx::Error),
    #[error("statement preparation failed: {0}")]
    Prepare(#[source] sqlx::Error),
    #[error("binding statement parameters failed: {0}")]
    Bind(#[source] sqlx::Error),
    #[error("statement execution failed: {0}")]
    Execute(#[source] sqlx::Error),
    #[error("commit failed: {0}")]
    Commit(#[source] sqlx::Error),
    #[error("rollback failed: {0}")]
    Rollback(#[source] sqlx::Error),
    #[error("closing connection failed: {0}")]
    Close(#[source] sqlx::Error),
    #[error("runtime initialization failed: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("unexpected parameters for {kind:?}: {detail}")]
    Parameters {
        kind: StatementKind,
        detail: String,
    },
    #[error("{0}")]
    Injected(String),
}

impl StorageError {
    /// Errors raised while binding parameters to a prepared statement.
    ///
    /// Binding errors abort the batch; other execution errors are per row.
    pub fn is_binding(&self) -> bool {
        matches!(
            self,
            StorageError::Bind(_) | StorageError::Parameters { .. }
        )
    }
}

/// A connection that can open transactions.
pub trait Storage {
    type Transaction<'s>: StorageTransaction
    where
        Self: 's;

    fn begin(&mut self) -> Result<Self::Transaction<'_>, StorageError>;
}

/// An open transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) must leave
/// the store as it was before [`Storage::begin`].
pub trait StorageTransaction {
    /// Handle to a prepared statement, reusable for the life of the transaction.
    type Statement;

    fn prepare(&mut self, query: &QueryText) -> Result<Self::Statement, StorageError>;

    /// Bind `params` and execute, returning the number of affected rows.
    fn execute(&mut self, statement: &Self::Statement, params: &[Param<'_>])
    -> Result<u64, StorageError>;

    /// Bind `params` and fetch the first column of the first row, if any.
    fn fetch_id(
        &mut self,
        statement: &Self::Statement,
        params: &[Param<'_>],
    ) -> Result<Option<i64>, StorageError>;

    fn commit(self) -> Result<(), StorageError>;

    fn rollback(self) -> Result<(), StorageError>;
}
