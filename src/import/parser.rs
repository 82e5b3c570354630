//! Input line parsing.
//!
//! Converts one raw line of the quantity file into a validated [`Record`].
//! The accepted shape is exactly:
//!
//! ```text
//! <identifier>;<quantity>
//! ```
//!
//! - **identifier**: 1 to 13 characters, none of them whitespace or `;`
//! - **quantity**: optional `+`/`-` sign followed by base-10 digits, in the
//!   32-bit signed range
//!
//! Anything after the quantity digits (normally just the line terminator) is
//! ignored. Neither field is trimmed: a leading space is a malformed line.
//!
//! Parsing is pure. Line numbering and reading live in
//! [`crate::import::input`].

use std::fmt;
use thiserror::Error;

use crate::config::{BoundedString, LengthExceeded};

/// Maximum number of bytes a single input line may occupy, terminator included.
pub const MAX_LINE_LENGTH: usize = 32;

/// Maximum identifier length (EAN-13).
pub const IDENTIFIER_LENGTH: usize = 13;

/// Field separator between identifier and quantity.
pub const SEPARATOR: u8 = b';';

/// Reasons a line can fail to produce a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("empty line")]
    Empty,
    #[error("malformed line, expected `<identifier>;<quantity>`")]
    Malformed,
    #[error("identifier longer than {IDENTIFIER_LENGTH} characters")]
    IdentifierTooLong,
    #[error("line longer than {MAX_LINE_LENGTH} bytes")]
    Truncated,
    #[error("quantity does not fit a 32-bit signed integer")]
    QuantityOutOfRange,
    #[error("source read failed: {0}")]
    Unreadable(String),
}

/// Product identifier as it appears in the input file.
///
/// Opaque beyond its length: no EAN checksum is verified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(BoundedString<IDENTIFIER_LENGTH>);

impl Identifier {
    pub fn new(value: &str) -> Result<Self, ParseErrorKind> {
        if value.is_empty() || value.bytes().any(|b| b.is_ascii_whitespace() || b == SEPARATOR) {
            return Err(ParseErrorKind::Malformed);
        }

        BoundedString::new(value)
            .map(Identifier)
            .map_err(|LengthExceeded { .. }| ParseErrorKind::IdentifierTooLong)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(identifier, quantity)` pair read from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    identifier: Identifier,
    quantity: i32,
}

impl Record {
    pub fn new(identifier: Identifier, quantity: i32) -> Self {
        Self {
            identifier,
            quantity,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.identifier, self.quantity)
    }
}

/// Parse a single raw line, terminator included or not.
///
/// The caller is responsible for enforcing [`MAX_LINE_LENGTH`] while reading;
/// a buffer that is already over the limit is rejected as
/// [`ParseErrorKind::Truncated`] here as well.
pub fn parse_line(line: &[u8]) -> Result<Record, ParseErrorKind> {
    if line.len() > MAX_LINE_LENGTH {
        return Err(ParseErrorKind::Truncated);
    }

    let content = strip_terminator(line);
    if content.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ParseErrorKind::Empty);
    }

    let id_len = content
        .iter()
        .position(|&b| b == SEPARATOR || b.is_ascii_whitespace())
        .unwrap_or(content.len());

    if id_len == 0 {
        return Err(ParseErrorKind::Malformed);
    }
    if id_len > IDENTIFIER_LENGTH {
        return Err(ParseErrorKind::IdentifierTooLong);
    }
    if content.get(id_len) != Some(&SEPARATOR) {
        return Err(ParseErrorKind::Malformed);
    }

    let identifier = std::str::from_utf8(&content[..id_len])
        .map_err(|_| ParseErrorKind::Malformed)
        .and_then(Identifier::new)?;
    let quantity = parse_quantity(&content[id_len + 1..])?;

    Ok(Record::new(identifier, quantity))
}

/// Drop one trailing `\n` or `\r\n`.
fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Parse an optionally signed decimal prefix; anything after the digits is ignored.
fn parse_quantity(field: &[u8]) -> Result<i32, ParseErrorKind> {
    let (negative, rest) = match field.first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };

    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(ParseErrorKind::Malformed);
    }

    // accumulate as i64 so i32::MIN stays representable
    let mut value: i64 = 0;
    for &b in &rest[..digits] {
        value = value * 10 + i64::from(b - b'0');
        if value > i64::from(i32::MAX) + 1 {
            return Err(ParseErrorKind::QuantityOutOfRange);
        }
    }
    let value = if negative { -value } else { value };

    i32::try_from(value).map_err(|_| ParseErrorKind::QuantityOutOfRange)
}
