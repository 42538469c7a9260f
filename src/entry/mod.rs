//! Batch files: one transaction descriptor per record.
//!
//! Record layout (positional, fields trimmed):
//! `<sender>, <receiver>, <value>, <payload>, <passphrase>[, <hash>[, <status>]]`

use std::path::Path;

use ethers_core::types::{H256, U256};
use tracing::warn;

use crate::defaults::Defaults;
use crate::error::EntryError;
use crate::types::TransactionParams;

pub mod sheet;
pub mod text;

pub use sheet::{SheetReader, SheetWriter};
pub use text::{TextReader, TextWriter};

pub const REQUIRED_FIELDS: usize = 5;
pub const FIELD_HASH: usize = 5;
pub const FIELD_STATUS: usize = 6;

/// Cell / field address inside a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    pub record: usize,
    pub field: usize,
}

pub trait EntryReader {
    /// Next descriptor in document order.
    fn read(&mut self) -> Result<TransactionParams, EntryError>;

    /// All remaining descriptors. Corrupt records are logged and skipped.
    fn read_all(&mut self) -> Result<Vec<TransactionParams>, EntryError> {
        let mut out = Vec::new();
        loop {
            match self.read() {
                Ok(p) => out.push(p),
                Err(EntryError::EndOfInput) => return Ok(out),
                Err(EntryError::CorruptRecord { record, reason }) => {
                    warn!(record, %reason, "skipping corrupted record");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub trait EntryWriter {
    /// Set the field at `at`, appending empty fields as needed.
    fn write_string(&mut self, at: Locator, value: &str) -> Result<(), EntryError>;

    /// Persist every pending write.
    fn flush(&mut self) -> Result<(), EntryError>;
}

pub trait EntryReadWriter: EntryReader + EntryWriter {}

impl<T: EntryReader + EntryWriter> EntryReadWriter for T {}

/// A reader and a writer over the same file.
pub struct ReadWriter<R, W> {
    reader: R,
    writer: W,
}

impl<R: EntryReader, W: EntryWriter> ReadWriter<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: EntryReader, W> EntryReader for ReadWriter<R, W> {
    fn read(&mut self) -> Result<TransactionParams, EntryError> {
        self.reader.read()
    }
}

impl<R, W: EntryWriter> EntryWriter for ReadWriter<R, W> {
    fn write_string(&mut self, at: Locator, value: &str) -> Result<(), EntryError> {
        self.writer.write_string(at, value)
    }

    fn flush(&mut self) -> Result<(), EntryError> {
        self.writer.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Sheet,
    Text,
}

impl BatchFormat {
    /// `.xlsx` (any case) is a spreadsheet; everything else is delimited text.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case(Defaults::SHEET_EXTENSION) => BatchFormat::Sheet,
            _ => BatchFormat::Text,
        }
    }
}

pub fn open_reader(path: &Path, sheet: &str) -> Result<Box<dyn EntryReader>, EntryError> {
    Ok(match BatchFormat::from_path(path) {
        BatchFormat::Sheet => Box::new(SheetReader::open(path, sheet)?),
        BatchFormat::Text => Box::new(TextReader::open(path)?),
    })
}

pub fn open_read_writer(path: &Path, sheet: &str) -> Result<Box<dyn EntryReadWriter>, EntryError> {
    Ok(match BatchFormat::from_path(path) {
        BatchFormat::Sheet => Box::new(ReadWriter::new(
            SheetReader::open(path, sheet)?,
            SheetWriter::open(path, sheet)?,
        )),
        BatchFormat::Text => Box::new(ReadWriter::new(TextReader::open(path)?, TextWriter::open(path)?)),
    })
}

fn parse_hash(s: &str) -> Option<H256> {
    let bytes = hex::decode(crate::util::strip_0x(s)).ok()?;
    (bytes.len() == 32).then(|| H256::from_slice(&bytes))
}

fn parse_status(s: &str) -> Option<Option<bool>> {
    match s.to_ascii_lowercase().as_str() {
        "" => Some(None),
        "true" | "1" => Some(Some(true)),
        "false" | "0" => Some(Some(false)),
        _ => None,
    }
}

/// Turn the fields of one record into a descriptor.
pub(crate) fn parse_record<S: AsRef<str>>(record: usize, fields: &[S]) -> Result<TransactionParams, EntryError> {
    let corrupt = |reason: String| EntryError::CorruptRecord { record, reason };
    let field = |i: usize| fields.get(i).map(|f| f.as_ref().trim()).unwrap_or_default();

    if fields.len() < REQUIRED_FIELDS {
        return Err(corrupt(format!(
            "expected at least {REQUIRED_FIELDS} fields, got {}",
            fields.len()
        )));
    }

    let raw_value = field(2);
    let bad_value = || corrupt(format!("invalid transfer value {raw_value:?}"));
    if raw_value.is_empty() || !raw_value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_value());
    }
    let value = U256::from_dec_str(raw_value).map_err(|_| bad_value())?;

    let hash = match field(FIELD_HASH) {
        "" => None,
        h => Some(parse_hash(h).ok_or_else(|| corrupt(format!("invalid hash {h:?}")))?),
    };
    let status = parse_status(field(FIELD_STATUS))
        .ok_or_else(|| corrupt(format!("invalid status {:?}", field(FIELD_STATUS))))?;

    let passphrase = match field(4) {
        "" => None,
        p => Some(p.to_string()),
    };

    Ok(TransactionParams {
        record,
        from: field(0).to_string(),
        to: field(1).to_string(),
        value,
        data: field(3).to_string(),
        passphrase,
        hash,
        status,
    })
}
