//! Import session coordination.
//!
//! The [`ImportSession`] drives one import end to end:
//! 1. Open the input stream
//! 2. Open a transaction and prepare statements
//! 3. Apply every record read from the input
//! 4. Commit at end of input, or roll back at the first bad line or
//!    binding error
//!
//! The input is closed on every path before the outcome is returned.

use std::io::BufRead;
use std::path::Path;

use crate::import::executor::{BatchExecutor, ImportOptions};
use crate::import::input::InputStream;
use crate::import::statements::Statements;
use crate::import::stats::{BatchCounters, BatchOutcome, RollbackReason};
use crate::storage::Storage;

/// One import of one input file into one transaction.
pub struct ImportSession<'a, S> {
    storage: &'a mut S,
    statements: Statements,
    options: ImportOptions,
}

impl<'a, S: Storage> ImportSession<'a, S> {
    /// Create a session over `storage`.
    ///
    /// # Arguments
    /// * `storage` - Connected store; used exclusively for the session
    /// * `statements` - SQL qualified with the configured table prefix
    /// * `options` - Which statements to run per record
    pub fn new(storage: &'a mut S, statements: Statements, options: ImportOptions) -> Self {
        Self {
            storage,
            statements,
            options,
        }
    }

    /// Import the file at `path`.
    ///
    /// An unopenable file is fatal and no transaction is started.
    pub fn run(self, path: &Path) -> BatchOutcome {
        log::info!("importing quantities from {}", path.display());
        match InputStream::open(path) {
            Ok(input) => self.run_stream(input),
            Err(err) => BatchOutcome::fatal(BatchCounters::default(), err),
        }
    }

    /// Import every record of an already opened stream.
    pub fn run_stream<R: BufRead>(self, mut input: InputStream<R>) -> BatchOutcome {
        let outcome = self.apply_all(&mut input);
        input.close();
        outcome
    }

    fn apply_all<R: BufRead>(self, input: &mut InputStream<R>) -> BatchOutcome {
        let Self {
            storage,
            statements,
            options,
        } = self;

        let mut executor = match BatchExecutor::begin(storage, &statements, options) {
            Ok(executor) => executor,
            Err(reason) => return BatchOutcome::fatal(BatchCounters::default(), reason),
        };

        loop {
            match input.next_record() {
                Ok(Some(record)) => {
                    if let Err(failure) = executor.apply(input.line(), record) {
                        return executor.roll_back(RollbackReason::Binding(failure));
                    }
                }
                Ok(None) => {
                    log::debug!("end of input after {} lines", input.line());
                    break;
                }
                Err(failure) => return executor.roll_back(RollbackReason::Parse(failure)),
            }
        }

        executor.commit()
    }
}
