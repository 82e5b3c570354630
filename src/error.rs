use thiserror::Error;

use crate::config::ConfigError;
use crate::import::statements::InvalidTablePrefix;
use crate::import::stats::{FatalReason, RollbackReason};
use crate::storage::StorageError;

/// Everything that makes the import command exit unsuccessfully.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    TablePrefix(#[from] InvalidTablePrefix),
    #[error("failed to connect to the database: {0}")]
    Connection(#[source] StorageError),
    #[error("import rolled back, database left unchanged: {0}")]
    RolledBack(#[source] RollbackReason),
    #[error("import failed: {0}")]
    Fatal(#[source] FatalReason),
}

impl ImportError {
    /// Input line the failure points at, when there is one.
    pub fn line(&self) -> Option<usize> {
        match self {
            ImportError::RolledBack(reason) => reason.line(),
            ImportError::Fatal(reason) => reason.line(),
            _ => None,
        }
    }
}
