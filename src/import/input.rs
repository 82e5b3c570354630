//! Line-oriented reader over the quantity file.
//!
//! [`InputStream`] owns the file cursor, counts lines (1-based) and runs each
//! line through [`parse_line`]. It stops for good at the first error or at
//! end of input.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::import::parser::{MAX_LINE_LENGTH, ParseErrorKind, Record, parse_line};

/// The input file could not be opened.
#[derive(Debug, Error)]
#[error("failed to open input file '{}': {source}", path.display())]
pub struct SourceUnavailable {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A line that did not yield a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input file at line {line}: {kind}")]
pub struct ParseFailure {
    pub line: usize,
    pub kind: ParseErrorKind,
}

/// Streaming reader producing one [`Record`] per line.
#[derive(Debug)]
pub struct InputStream<R> {
    reader: Option<R>,
    line: usize,
    buf: Vec<u8>,
    finished: bool,
}

impl InputStream<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, SourceUnavailable> {
        let file = File::open(path).map_err(|source| SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("opened input file {}", path.display());
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> InputStream<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader: Some(reader),
            line: 0,
            buf: Vec::with_capacity(MAX_LINE_LENGTH + 1),
            finished: false,
        }
    }

    /// Advance one line.
    ///
    /// Returns `Ok(None)` at end of input. After `Ok(None)` or an error has
    /// been returned, every further call returns `Ok(None)`.
    pub fn next_record(&mut self) -> Result<Option<Record>, ParseFailure> {
        if self.finished {
            return Ok(None);
        }
        let Some(reader) = self.reader.as_mut() else {
            self.finished = true;
            return Ok(None);
        };

        self.line += 1;
        self.buf.clear();

        let result = read_bounded_line(reader, &mut self.buf).and_then(|read| {
            if read == 0 {
                return Ok(None);
            }
            match parse_line(&self.buf) {
                Ok(record) => Ok(Some(record)),
                // a blank last line is just the end of the file
                Err(ParseErrorKind::Empty) if at_eof(reader)? => Ok(None),
                Err(kind) => Err(kind),
            }
        });

        match result {
            Ok(Some(record)) => {
                log::trace!("line {}: {}", self.line, record);
                Ok(Some(record))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(kind) => {
                self.finished = true;
                Err(ParseFailure {
                    line: self.line,
                    kind,
                })
            }
        }
    }

    /// Line number of the most recent read attempt (0 before the first).
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Release the underlying source. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!("closed input after {} lines", self.line);
        }
        self.finished = true;
    }
}

impl<R> Default for InputStream<R> {
    /// A stream that was never opened.
    fn default() -> Self {
        Self {
            reader: None,
            line: 0,
            buf: Vec::new(),
            finished: true,
        }
    }
}

/// Read up to the next `\n`, refusing lines longer than [`MAX_LINE_LENGTH`].
fn read_bounded_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<usize, ParseErrorKind> {
    let limit = MAX_LINE_LENGTH as u64 + 1;
    let read = reader
        .by_ref()
        .take(limit)
        .read_until(b'\n', buf)
        .map_err(unreadable)?;

    if buf.len() > MAX_LINE_LENGTH {
        return Err(ParseErrorKind::Truncated);
    }
    Ok(read)
}

fn at_eof<R: BufRead>(reader: &mut R) -> Result<bool, ParseErrorKind> {
    reader
        .fill_buf()
        .map(|remaining| remaining.is_empty())
        .map_err(unreadable)
}

fn unreadable(err: io::Error) -> ParseErrorKind {
    ParseErrorKind::Unreadable(err.to_string())
}
