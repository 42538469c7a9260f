use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Range, Reader as _, Xlsx};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{parse_record, EntryReader, EntryWriter, Locator};
use crate::error::EntryError;
use crate::types::TransactionParams;

fn cell_text(cell: &Data) -> String {
    cell.to_string().trim().to_string()
}

/// Sheet contents as an absolute grid (row 0 / column 0 is the sheet origin).
fn to_grid(range: &Range<Data>) -> Vec<Vec<Data>> {
    let Some((row0, col0)) = range.start() else {
        return Vec::new();
    };
    let mut grid = vec![Vec::new(); row0 as usize];
    for row in range.rows() {
        let mut cells = vec![Data::Empty; col0 as usize];
        cells.extend(row.iter().cloned());
        grid.push(cells);
    }
    grid
}

fn load_sheet(path: &Path, sheet: &str) -> Result<Vec<Vec<Data>>, EntryError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    if !workbook.sheet_names().iter().any(|n| n == sheet) {
        return Err(EntryError::SheetNotFound(sheet.to_string()));
    }
    Ok(to_grid(&workbook.worksheet_range(sheet)?))
}

/// Reads descriptors from one sheet of an xlsx workbook. Row 0 is a header.
pub struct SheetReader {
    grid: Vec<Vec<Data>>,
    next: usize,
}

impl SheetReader {
    pub fn open(path: &Path, sheet: &str) -> Result<Self, EntryError> {
        Ok(Self {
            grid: load_sheet(path, sheet)?,
            next: 1,
        })
    }
}

impl EntryReader for SheetReader {
    fn read(&mut self) -> Result<TransactionParams, EntryError> {
        if self.grid.is_empty() {
            return Err(EntryError::EmptyContent);
        }
        while let Some(row) = self.grid.get(self.next) {
            let record = self.next;
            self.next += 1;
            if row.iter().all(|c| *c == Data::Empty) {
                continue;
            }
            let fields: Vec<String> = row.iter().map(cell_text).collect();
            return parse_record(record, &fields);
        }
        Err(EntryError::EndOfInput)
    }
}

/// Pending annotations: zero-based row -> zero-based column -> text.
type Pending = BTreeMap<u32, BTreeMap<u32, String>>;

/// Zero-based (row, column) of an A1 reference such as `F2`.
fn parse_cell_ref(r: &str) -> Option<(u32, u32)> {
    let split = r.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = r.split_at(split);
    if letters.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        let digit = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    let row: u32 = digits.parse().ok()?;
    Some((row.checked_sub(1)?, col - 1))
}

fn cell_ref(row: u32, col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        letters.push(char::from(b'A' + ((n - 1) % 26) as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect::<String>() + &(row + 1).to_string()
}

fn attr(e: &BytesStart, key: &[u8]) -> Result<Option<String>, EntryError> {
    Ok(match e.try_get_attribute(key)? {
        Some(a) => Some(a.unescape_value()?.into_owned()),
        None => None,
    })
}

fn read_part<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, EntryError> {
    let mut content = String::new();
    archive.by_name(name)?.read_to_string(&mut content)?;
    Ok(content)
}

/// Archive path of the worksheet named `sheet`, resolved through
/// `xl/workbook.xml` and its relationships.
fn sheet_part<R: Read + Seek>(archive: &mut ZipArchive<R>, sheet: &str) -> Result<String, EntryError> {
    let workbook = read_part(archive, "xl/workbook.xml")?;
    let mut reader = Reader::from_str(&workbook);
    let mut rel_id = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                if attr(&e, b"name")?.as_deref() != Some(sheet) {
                    continue;
                }
                for a in e.attributes() {
                    let a = a?;
                    if a.key.local_name().as_ref() == b"id" && a.key.prefix().is_some() {
                        rel_id = Some(a.unescape_value()?.into_owned());
                    }
                }
                break;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    let rel_id = rel_id.ok_or_else(|| EntryError::SheetNotFound(sheet.to_string()))?;

    let rels = read_part(archive, "xl/_rels/workbook.xml.rels")?;
    let mut reader = Reader::from_str(&rels);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if attr(&e, b"Id")?.as_deref() != Some(rel_id.as_str()) {
                    continue;
                }
                let target = attr(&e, b"Target")?.ok_or_else(|| {
                    EntryError::MalformedWorkbook(format!("relationship {rel_id} has no target"))
                })?;
                return Ok(match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{target}"),
                });
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Err(EntryError::MalformedWorkbook(format!("no relationship {rel_id} for sheet {sheet:?}")))
}

/// Streams a worksheet part and splices pending cells into `<sheetData>`.
/// Every other element, including formulas and styles of untouched cells,
/// is copied unchanged.
struct SheetPatch {
    out: Writer<Vec<u8>>,
    pending: Pending,
    prefix: String,
    next_row: u32,
    row: u32,
    next_col: u32,
    row_cells: Option<BTreeMap<u32, String>>,
}

impl SheetPatch {
    fn prefixed(&self, local: &str) -> String {
        format!("{}{local}", self.prefix)
    }

    fn write_cell(&mut self, row: u32, col: u32, value: &str, style: Option<&str>) -> Result<(), EntryError> {
        let name = self.prefixed("c");
        let r = cell_ref(row, col);
        let mut cell = BytesStart::new(name.as_str());
        cell.push_attribute(("r", r.as_str()));
        if let Some(s) = style {
            cell.push_attribute(("s", s));
        }
        cell.push_attribute(("t", "inlineStr"));
        let is = self.prefixed("is");
        let t = self.prefixed("t");

        self.out.write_event(Event::Start(cell.to_owned()))?;
        self.out.write_event(Event::Start(BytesStart::new(is.as_str())))?;
        self.out.write_event(Event::Start(BytesStart::new(t.as_str())))?;
        self.out.write_event(Event::Text(BytesText::new(value)))?;
        self.out.write_event(Event::End(BytesEnd::new(t.as_str())))?;
        self.out.write_event(Event::End(BytesEnd::new(is.as_str())))?;
        self.out.write_event(Event::End(cell.to_end().into_owned()))?;
        Ok(())
    }

    fn write_cells(&mut self, row: u32, cells: BTreeMap<u32, String>) -> Result<(), EntryError> {
        for (col, value) in cells {
            self.write_cell(row, col, &value, None)?;
        }
        Ok(())
    }

    /// Emit whole new rows for pending rows before `limit`.
    fn write_rows_before(&mut self, limit: u32) -> Result<(), EntryError> {
        let later = self.pending.split_off(&limit);
        let earlier = std::mem::replace(&mut self.pending, later);
        for (row, cells) in earlier {
            let name = self.prefixed("row");
            let r = (row + 1).to_string();
            let mut start = BytesStart::new(name.as_str());
            start.push_attribute(("r", r.as_str()));
            self.out.write_event(Event::Start(start.to_owned()))?;
            self.write_cells(row, cells)?;
            self.out.write_event(Event::End(start.to_end().into_owned()))?;
        }
        Ok(())
    }

    /// Emit pending cells of the current row that sort before `col`.
    fn write_cells_before(&mut self, col: u32) -> Result<(), EntryError> {
        let Some(cells) = self.row_cells.as_mut() else {
            return Ok(());
        };
        let later = cells.split_off(&col);
        let earlier = std::mem::replace(cells, later);
        self.write_cells(self.row, earlier)
    }

    fn row_index(&mut self, e: &BytesStart) -> Result<u32, EntryError> {
        let row = match attr(e, b"r")? {
            Some(r) => r
                .parse::<u32>()
                .ok()
                .and_then(|r| r.checked_sub(1))
                .ok_or_else(|| EntryError::MalformedWorkbook(format!("bad row number {r:?}")))?,
            None => self.next_row,
        };
        self.next_row = row + 1;
        self.next_col = 0;
        self.row = row;
        Ok(row)
    }

    fn col_index(&mut self, e: &BytesStart) -> Result<u32, EntryError> {
        let col = match attr(e, b"r")? {
            Some(r) => parse_cell_ref(&r)
                .map(|(_, c)| c)
                .ok_or_else(|| EntryError::MalformedWorkbook(format!("bad cell reference {r:?}")))?,
            None => self.next_col,
        };
        self.next_col = col + 1;
        Ok(col)
    }

    /// Flush earlier pending cells, then write the replacement for this cell
    /// if one is pending. Returns whether the original cell was replaced.
    fn replace_cell(&mut self, e: &BytesStart) -> Result<bool, EntryError> {
        let col = self.col_index(e)?;
        self.write_cells_before(col)?;
        let Some(value) = self.row_cells.as_mut().and_then(|cells| cells.remove(&col)) else {
            return Ok(false);
        };
        let style = attr(e, b"s")?;
        self.write_cell(self.row, col, &value, style.as_deref())?;
        Ok(true)
    }

    /// Row start tag with `spans` dropped, since new cells may fall outside it.
    fn without_spans(e: &BytesStart) -> Result<BytesStart<'static>, EntryError> {
        let mut row = e.to_owned();
        row.clear_attributes();
        for a in e.attributes() {
            let a = a?;
            if a.key.as_ref() != b"spans" {
                row.push_attribute(a);
            }
        }
        Ok(row)
    }

    /// `<dimension ref="A1:E3"/>` widened to cover the pending cells.
    fn widen_dimension(&self, e: &BytesStart) -> Result<BytesStart<'static>, EntryError> {
        let mut dim = e.to_owned();
        let Some(range) = attr(e, b"ref")? else {
            return Ok(dim);
        };
        let (first, last) = range.split_once(':').unwrap_or((range.as_str(), range.as_str()));
        let (Some(first), Some((mut last_row, mut last_col))) = (parse_cell_ref(first), parse_cell_ref(last)) else {
            return Ok(dim);
        };
        for (row, cells) in &self.pending {
            last_row = last_row.max(*row);
            if let Some(col) = cells.keys().next_back() {
                last_col = last_col.max(*col);
            }
        }
        let widened = format!("{}:{}", cell_ref(first.0, first.1), cell_ref(last_row, last_col));
        dim.clear_attributes();
        for a in e.attributes() {
            let a = a?;
            if a.key.as_ref() == b"ref" {
                dim.push_attribute(("ref", widened.as_str()));
            } else {
                dim.push_attribute(a);
            }
        }
        Ok(dim)
    }
}

fn prefix_of(e: &BytesStart) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

/// Apply `pending` to one worksheet XML document.
fn patch_sheet_xml(xml: &[u8], pending: Pending) -> Result<Vec<u8>, EntryError> {
    let mut reader = Reader::from_reader(xml);
    let mut p = SheetPatch {
        out: Writer::new(Vec::with_capacity(xml.len() + 512)),
        pending,
        prefix: String::new(),
        next_row: 0,
        row: 0,
        next_col: 0,
        row_cells: None,
    };
    let mut found_data = false;
    // depth inside a replaced cell whose old content is dropped
    let mut skipping = 0usize;

    loop {
        let event = reader.read_event()?;
        if skipping > 0 {
            match event {
                Event::Start(_) => skipping += 1,
                Event::End(_) => skipping -= 1,
                Event::Eof => return Err(EntryError::MalformedWorkbook("unterminated cell".into())),
                _ => {}
            }
            continue;
        }
        let local = match &event {
            Event::Start(e) | Event::Empty(e) => e.local_name().as_ref().to_vec(),
            Event::End(e) => e.local_name().as_ref().to_vec(),
            _ => Vec::new(),
        };

        match (event, local.as_slice()) {
            (Event::Eof, _) => break,
            (Event::Empty(e), b"dimension") => {
                let dim = p.widen_dimension(&e)?;
                p.out.write_event(Event::Empty(dim))?;
            }
            (Event::Start(e), b"sheetData") => {
                found_data = true;
                p.prefix = prefix_of(&e);
                p.out.write_event(Event::Start(e))?;
            }
            (Event::Empty(e), b"sheetData") => {
                found_data = true;
                p.prefix = prefix_of(&e);
                let end = e.to_end().into_owned();
                p.out.write_event(Event::Start(e))?;
                p.write_rows_before(u32::MAX)?;
                p.out.write_event(Event::End(end))?;
            }
            (Event::End(e), b"sheetData") => {
                p.write_rows_before(u32::MAX)?;
                p.out.write_event(Event::End(e))?;
            }
            (Event::Start(e), b"row") => {
                let row = p.row_index(&e)?;
                p.write_rows_before(row)?;
                p.row_cells = p.pending.remove(&row);
                if p.row_cells.is_some() {
                    let start = SheetPatch::without_spans(&e)?;
                    p.out.write_event(Event::Start(start))?;
                } else {
                    p.out.write_event(Event::Start(e))?;
                }
            }
            (Event::Empty(e), b"row") => {
                let row = p.row_index(&e)?;
                p.write_rows_before(row)?;
                match p.pending.remove(&row) {
                    Some(cells) => {
                        let start = SheetPatch::without_spans(&e)?;
                        let end = start.to_end().into_owned();
                        p.out.write_event(Event::Start(start))?;
                        p.write_cells(row, cells)?;
                        p.out.write_event(Event::End(end))?;
                    }
                    None => p.out.write_event(Event::Empty(e))?,
                }
            }
            (Event::End(e), b"row") => {
                if let Some(cells) = p.row_cells.take() {
                    p.write_cells(p.row, cells)?;
                }
                p.out.write_event(Event::End(e))?;
            }
            (Event::Start(e), b"c") if p.row_cells.is_some() => {
                if p.replace_cell(&e)? {
                    skipping = 1;
                } else {
                    p.out.write_event(Event::Start(e))?;
                }
            }
            (Event::Empty(e), b"c") if p.row_cells.is_some() => {
                if !p.replace_cell(&e)? {
                    p.out.write_event(Event::Empty(e))?;
                }
            }
            (event, _) => p.out.write_event(event)?,
        }
    }

    if !found_data || !p.pending.is_empty() {
        return Err(EntryError::MalformedWorkbook("worksheet has no sheetData".into()));
    }
    Ok(p.out.into_inner())
}

/// Edits annotation cells of one worksheet in place.
///
/// Writes are buffered; `flush` copies the archive entry by entry into a
/// sibling file, patching only the target worksheet, and renames it over
/// the original. Formulas, styles and every other sheet stay untouched.
pub struct SheetWriter {
    path: PathBuf,
    part: String,
    rows: usize,
    pending: Pending,
}

impl SheetWriter {
    pub fn open(path: &Path, sheet: &str) -> Result<Self, EntryError> {
        let rows = load_sheet(path, sheet)?.len();
        let mut archive = ZipArchive::new(File::open(path)?)?;
        let part = sheet_part(&mut archive, sheet)?;
        Ok(Self {
            path: path.to_path_buf(),
            part,
            rows,
            pending: Pending::new(),
        })
    }

    fn rewrite(&self, tmp: &Path) -> Result<(), EntryError> {
        let mut archive = ZipArchive::new(File::open(&self.path)?)?;
        let mut zip = ZipWriter::new(File::create(tmp)?);
        let mut patched = false;

        for i in 0..archive.len() {
            let name = archive.by_index_raw(i)?.name().to_string();
            if name != self.part {
                zip.raw_copy_file(archive.by_index_raw(i)?)?;
                continue;
            }
            let mut xml = Vec::new();
            archive.by_index(i)?.read_to_end(&mut xml)?;
            let xml = patch_sheet_xml(&xml, self.pending.clone())?;
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(name, options)?;
            zip.write_all(&xml)?;
            patched = true;
        }
        if !patched {
            return Err(EntryError::MalformedWorkbook(format!("missing worksheet part {}", self.part)));
        }
        zip.finish()?.sync_all()?;
        Ok(())
    }
}

impl EntryWriter for SheetWriter {
    fn write_string(&mut self, at: Locator, value: &str) -> Result<(), EntryError> {
        if at.record >= self.rows {
            return Err(EntryError::RecordIndexExceed(at.record));
        }
        let exceed = |_| EntryError::RecordIndexExceed(at.record);
        let row = u32::try_from(at.record).map_err(exceed)?;
        let col = u32::try_from(at.field).map_err(exceed)?;
        self.pending.entry(row).or_default().insert(col, value.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EntryError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self.path.with_file_name(format!(".{file_name}.tmp"));
        if let Err(e) = self.rewrite(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &self.path)?;
        self.pending.clear();
        Ok(())
    }
}
