use std::io::{self, BufRead, Cursor, Read, Write};
use std::path::Path;

use quantity_import::import::{
    BatchStatus, FatalReason, ImportOptions, ImportSession, InputStream, ParseErrorKind,
    RollbackReason, Statements,
};
use quantity_import::storage::StatementKind;
use quantity_import::test_support::MemoryStorage;
use tempfile::NamedTempFile;

fn input_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write input");
    file.flush().expect("flush input");
    file
}

fn session(storage: &mut MemoryStorage) -> ImportSession<'_, MemoryStorage> {
    ImportSession::new(
        storage,
        Statements::new("ps_").expect("valid prefix"),
        ImportOptions::default(),
    )
}

#[test]
fn well_formed_file_commits() {
    let mut storage = MemoryStorage::new()
        .with_product("0000000000001", 100)
        .with_product("0000000000002", 100);
    let file = input_file("0000000000001;5\n0000000000002;-3\n");

    let outcome = session(&mut storage).run(file.path());

    assert!(outcome.is_committed());
    let counters = outcome.counters();
    assert_eq!(counters.read, 2);
    assert_eq!(counters.applied, 2);
    assert_eq!(counters.no_match, 0);
    assert_eq!(counters.applied + counters.no_match, 2);
    assert_eq!(storage.quantity("0000000000001"), Some(5));
    assert_eq!(storage.quantity("0000000000002"), Some(-3));
    assert_eq!(storage.commits, 1);
}

#[test]
fn unmatched_identifiers_still_commit() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 100);
    let file = input_file("0000000000001;5\n0000000000002;-3");

    let outcome = session(&mut storage).run(file.path());

    assert!(outcome.is_committed());
    assert_eq!(outcome.counters().applied, 1);
    assert_eq!(outcome.counters().no_match, 1);
}

#[test]
fn malformed_line_rolls_back_everything() {
    let mut storage = MemoryStorage::new()
        .with_product("0000000000001", 100)
        .with_product("0000000000002", 100);
    let before = storage.snapshot();
    let file = input_file("0000000000001;5\n0000000000002;-3\nbad-row\n0000000000001;7\n");

    let outcome = session(&mut storage).run(file.path());

    match outcome.status() {
        BatchStatus::RolledBack(RollbackReason::Parse(failure)) => {
            assert_eq!(failure.line, 3);
            assert_eq!(failure.kind, ParseErrorKind::Malformed);
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(outcome.failed_line(), Some(3));
    assert_eq!(outcome.counters().read, 2);
    assert_eq!(storage.snapshot(), before);
    assert_eq!(storage.commits, 0);
    assert_eq!(storage.rollbacks, 1);
}

#[test]
fn first_malformed_line_is_reported() {
    let mut storage = MemoryStorage::new();
    let file = input_file("0000000000001;5\n12345678901234;1\nbad-row\n");

    let outcome = session(&mut storage).run(file.path());

    assert_eq!(outcome.failed_line(), Some(2));
    let err = outcome.into_result().unwrap_err();
    assert_eq!(err.line(), Some(2));
    assert!(err.to_string().contains("line 2"));
}

#[test]
fn overlong_line_rolls_back() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 1);
    let file = input_file(&format!("0000000000001;5\n0000000000001;{}\n", "1".repeat(40)));

    let outcome = session(&mut storage).run(file.path());

    match outcome.status() {
        BatchStatus::RolledBack(RollbackReason::Parse(failure)) => {
            assert_eq!(failure.line, 2);
            assert_eq!(failure.kind, ParseErrorKind::Truncated);
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(storage.quantity("0000000000001"), Some(1));
}

#[test]
fn empty_file_commits_nothing() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 1);
    let file = input_file("");

    let outcome = session(&mut storage).run(file.path());

    assert!(outcome.is_committed());
    assert_eq!(outcome.counters().read, 0);
    assert_eq!(storage.executions, 0);
}

#[test]
fn missing_input_is_fatal_without_transaction() {
    let mut storage = MemoryStorage::new();

    let outcome = session(&mut storage).run(Path::new("/nonexistent/quantities.txt"));

    assert!(matches!(
        outcome.status(),
        BatchStatus::Fatal(FatalReason::SourceUnavailable(_))
    ));
    assert!(storage.prepared.is_empty());
    assert_eq!(storage.commits + storage.rollbacks, 0);
}

#[test]
fn prepare_failure_touches_no_rows() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 1);
    storage.failures.prepare = Some(StatementKind::UpdateQuantity);
    let file = input_file("0000000000001;5\n");

    let outcome = session(&mut storage).run(file.path());

    assert!(matches!(
        outcome.status(),
        BatchStatus::Fatal(FatalReason::PrepareFailed(_))
    ));
    assert_eq!(storage.executions, 0);
    assert_eq!(storage.quantity("0000000000001"), Some(1));
}

#[test]
fn row_errors_do_not_abort_the_batch() {
    let mut storage = MemoryStorage::new()
        .with_product("0000000000001", 1)
        .with_product("0000000000002", 1)
        .with_product("0000000000003", 1);
    storage
        .failures
        .execute_for
        .insert("0000000000002".to_string());
    let file = input_file("0000000000001;10\n0000000000002;20\n0000000000003;30\n");

    let outcome = session(&mut storage).run(file.path());

    assert!(outcome.is_committed());
    assert_eq!(outcome.counters().read, 3);
    assert_eq!(outcome.counters().applied, 2);
    assert_eq!(outcome.counters().failed, 1);
    assert_eq!(storage.quantity("0000000000002"), Some(1));
    assert_eq!(storage.quantity("0000000000003"), Some(30));
}

#[test]
fn ambiguous_commit_is_distinct_from_rollback() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 1);
    storage.failures.commit = true;
    let file = input_file("0000000000001;5\n");

    let outcome = session(&mut storage).run(file.path());

    assert!(matches!(
        outcome.status(),
        BatchStatus::Fatal(FatalReason::CommitAmbiguous(_))
    ));
    let summary = outcome.summary();
    assert_eq!(summary.status, "fatal");
    assert!(summary.reason.unwrap().contains("unknown state"));
}

#[test]
fn stream_input_runs_with_stock_lookup() {
    let mut storage = MemoryStorage::new().with_stock("0000000000001", 0, 7);
    let input = InputStream::from_reader(Cursor::new(b"0000000000001;12".to_vec()));

    let outcome = ImportSession::new(
        &mut storage,
        Statements::new("ps_").expect("valid prefix"),
        ImportOptions {
            resolve_stock: true,
        },
    )
    .run_stream(input);

    assert!(outcome.is_committed());
    assert_eq!(outcome.counters().stock_resolved, 1);
    assert_eq!(storage.quantity("0000000000001"), Some(12));
}

#[test]
fn binding_failure_rolls_back_at_its_line() {
    let mut storage = MemoryStorage::new()
        .with_product("0000000000001", 1)
        .with_product("0000000000002", 1)
        .with_product("0000000000003", 1);
    storage
        .failures
        .bind_for
        .insert("0000000000002".to_string());
    let before = storage.snapshot();
    let file = input_file("0000000000001;10\n0000000000002;20\n0000000000003;30\n");

    let outcome = session(&mut storage).run(file.path());

    match outcome.status() {
        BatchStatus::RolledBack(RollbackReason::Binding(failure)) => {
            assert_eq!(failure.line, 2);
            assert_eq!(failure.identifier.as_str(), "0000000000002");
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(outcome.failed_line(), Some(2));
    assert_eq!(outcome.counters().read, 2);
    assert_eq!(storage.snapshot(), before);
    assert_eq!(storage.commits, 0);
    assert_eq!(storage.rollbacks, 1);
}

/// Yields its contents and then fails like a dropped network mount.
struct DisconnectingReader {
    data: Cursor<Vec<u8>>,
}

impl DisconnectingReader {
    fn drained(&self) -> bool {
        self.data.position() as usize >= self.data.get_ref().len()
    }
}

impl Read for DisconnectingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.drained() {
            return Err(io::Error::other("input went away"));
        }
        self.data.read(buf)
    }
}

impl BufRead for DisconnectingReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.drained() {
            return Err(io::Error::other("input went away"));
        }
        self.data.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.data.consume(amt);
    }
}

#[test]
fn read_error_mid_stream_rolls_back() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 1);
    let before = storage.snapshot();
    let input = InputStream::from_reader(DisconnectingReader {
        data: Cursor::new(b"0000000000001;9\n".to_vec()),
    });

    let outcome = session(&mut storage).run_stream(input);

    match outcome.status() {
        BatchStatus::RolledBack(RollbackReason::Parse(failure)) => {
            assert_eq!(failure.line, 2);
            assert!(matches!(failure.kind, ParseErrorKind::Unreadable(_)));
        }
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(outcome.counters().read, 1);
    assert_eq!(storage.snapshot(), before);
    assert_eq!(storage.rollbacks, 1);
}

#[test]
fn trailing_whitespace_line_still_commits() {
    let mut storage = MemoryStorage::new().with_product("0000000000001", 1);
    let file = input_file("0000000000001;4\n   \n");

    let outcome = session(&mut storage).run(file.path());

    assert!(outcome.is_committed());
    assert_eq!(storage.quantity("0000000000001"), Some(4));
}
