//! Quantity import pipeline.
//!
//! Reads `<identifier>;<quantity>` lines and writes the quantities to the
//! product table inside one transaction:
//!
//! 1. **Parsing** (`parser`) - Validates a single line into a `Record`
//! 2. **Input** (`input`) - Streams lines from the file and tracks line numbers
//! 3. **Execution** (`executor`) - Applies records through a prepared statement
//! 4. **Coordination** (`coordinator`) - Runs the whole import and decides
//!    between commit and rollback
//! 5. **Statistics** (`stats`) - Counters and the final outcome
//!
//! # Failure Policy
//!
//! A line that does not parse, or a record whose parameters cannot be bound,
//! rolls back the whole batch. A record whose update fails in storage is
//! logged and counted, and the batch continues.
//! A record matching no product is counted separately and is not an error.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use quantity_import::import::{ImportOptions, ImportSession, Statements};
//!
//! let statements = Statements::new("ps_")?;
//! let outcome = ImportSession::new(&mut store, statements, ImportOptions::default())
//!     .run(Path::new("quantities.csv"));
//!
//! println!("applied {} records", outcome.counters().applied);
//! ```

pub mod coordinator;
pub mod executor;
pub mod input;
pub mod parser;
pub mod statements;
pub mod stats;

pub use coordinator::ImportSession;
pub use executor::{BatchExecutor, BindingFailure, ImportOptions, RowExecutionError, RowOutcome};
pub use input::{InputStream, ParseFailure, SourceUnavailable};
pub use parser::{Identifier, ParseErrorKind, Record, parse_line};
pub use statements::Statements;
pub use stats::{BatchCounters, BatchOutcome, BatchStatus, FatalReason, RollbackReason};
