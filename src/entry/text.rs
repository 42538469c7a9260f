use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{Position, QuoteStyle, ReaderBuilder, StringRecordsIntoIter, Trim, WriterBuilder};

use super::{parse_record, EntryReader, EntryWriter, Locator};
use crate::error::EntryError;
use crate::types::TransactionParams;

/// One record per line: quotes carry no meaning, so a stray `"` cannot
/// swallow the lines after it.
fn reader_builder() -> ReaderBuilder {
    let mut b = ReaderBuilder::new();
    b.has_headers(false).flexible(true).trim(Trim::All).quoting(false);
    b
}

/// Zero-based line of a record, falling back to its ordinal.
fn line_of(position: Option<&Position>, ordinal: usize) -> usize {
    position
        .map(|p| p.line().saturating_sub(1) as usize)
        .unwrap_or(ordinal)
}

/// Streaming reader for comma-delimited batch files (no header line).
pub struct TextReader {
    records: StringRecordsIntoIter<File>,
    ordinal: usize,
}

impl TextReader {
    pub fn open(path: &Path) -> Result<Self, EntryError> {
        let reader = reader_builder().from_path(path)?;
        Ok(Self {
            records: reader.into_records(),
            ordinal: 0,
        })
    }
}

impl EntryReader for TextReader {
    fn read(&mut self) -> Result<TransactionParams, EntryError> {
        let ordinal = self.ordinal;
        self.ordinal += 1;
        match self.records.next() {
            None => Err(EntryError::EndOfInput),
            Some(Ok(record)) => {
                let fields: Vec<&str> = record.iter().collect();
                parse_record(line_of(record.position(), ordinal), &fields)
            }
            Some(Err(e)) if e.is_io_error() => Err(e.into()),
            Some(Err(e)) => Err(EntryError::CorruptRecord {
                record: line_of(e.position(), ordinal),
                reason: e.to_string(),
            }),
        }
    }
}

/// Buffers the whole file, applies writes in memory and rewrites it on flush.
///
/// Fields are kept as raw bytes, so lines the reader rejects (bad UTF-8,
/// too few fields) are written back as they were.
pub struct TextWriter {
    path: PathBuf,
    /// (line, fields)
    records: Vec<(usize, Vec<Vec<u8>>)>,
    dirty: bool,
}

impl TextWriter {
    pub fn open(path: &Path) -> Result<Self, EntryError> {
        let mut records = Vec::new();
        for (ordinal, record) in reader_builder().from_path(path)?.into_byte_records().enumerate() {
            let record = record?;
            let fields = record.iter().map(<[u8]>::to_vec).collect();
            records.push((line_of(record.position(), ordinal), fields));
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
            dirty: false,
        })
    }
}

impl EntryWriter for TextWriter {
    fn write_string(&mut self, at: Locator, value: &str) -> Result<(), EntryError> {
        let (_, fields) = self
            .records
            .iter_mut()
            .find(|(line, _)| *line == at.record)
            .ok_or(EntryError::RecordIndexExceed(at.record))?;
        if fields.len() <= at.field {
            fields.resize(at.field + 1, Vec::new());
        }
        fields[at.field] = value.as_bytes().to_vec();
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EntryError> {
        if !self.dirty {
            return Ok(());
        }
        let mut w = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(QuoteStyle::Never)
            .from_path(&self.path)?;
        for (_, fields) in &self.records {
            w.write_record(fields)?;
        }
        w.flush()?;
        self.dirty = false;
        Ok(())
    }
}
