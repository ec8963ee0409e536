//! # Excel Binary File Format reader (.xls)
//!
//! This crate provides a read-only parser for the *Excel Binary File Format*
//! (BIFF8, as written by Excel 97-2003)
//!
//! Excel Binary files are *Compound File Binary Format* structures: check the [ole2] crate for details
//!
//! The main entry points are [`open`] and [`Workbook`]; cells are exposed
//! through [`Worksheet`] as [`CellValue`]s
//!
//! The implementation follows
//! [\[MS-XLS\]](https://docs.microsoft.com/en-us/openspecs/office_file_formats/ms-xls/cd03cb5f-ca02-4934-a391-bb674cb8aa06)
//!
//! # Examples
//! ```no_run
//! use readxls::CellValue;
//!
//! let data = std::fs::read("MyWorkbook.xls").unwrap();
//! let workbook = readxls::open(&data).unwrap();
//! let sheet = workbook.sheet("Sheet1").unwrap();
//! if let CellValue::Number(n) = sheet.value(0, 0) {
//!     println!("A1 = {n}");
//! }
//! for cell in sheet.cells() {
//!     println!("({}, {}) = {}", cell.row, cell.column, cell.value);
//! }
//! ```

#![warn(missing_docs)]

pub mod cell;
pub mod config;
mod error;
pub mod records;
pub mod storage;
pub mod structures;
pub mod workbook;
pub mod worksheet;

pub use cell::{Cell, CellError, CellValue, FormulaResult};
pub use config::Config;
pub use error::ExcelError;
pub use storage::{SheetProperties, Storage};
pub use workbook::{DateMode, Workbook};
pub use worksheet::Worksheet;

use records::RecordType;
use std::{borrow::Cow, fmt, io};
use tracing::{debug, trace};

/// Parses a whole `.xls` file held in memory using the default [`Config`]
pub fn open(data: &[u8]) -> Result<Workbook, ExcelError> {
    open_with_config(data, &Config::default())
}

/// Parses a whole `.xls` file held in memory
pub fn open_with_config(data: &[u8], config: &Config) -> Result<Workbook, ExcelError> {
    Workbook::from_reader(io::Cursor::new(data), config)
}

/// A logical BIFF record
///
/// The payloads of the CONTINUE records following the record are appended to
/// its own; the position where each of them starts is kept as a *border*
///
/// The record doubles as a cursor over its payload: all the `rd*` readers
/// advance the position and fail with [`ExcelError::Format`] when reading past
/// the end of the payload
#[derive(Clone)]
pub struct Record<'a> {
    /// The record type
    pub ty: RecordType,
    /// The raw record type
    pub code: u16,
    /// Offset of the record header within the stream
    pub offset: u64,
    data: Cow<'a, [u8]>,
    borders: Vec<usize>,
    pos: usize,
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("ty", &self.ty)
            .field("code", &format_args!("0x{:04x}", self.code))
            .field("offset", &self.offset)
            .field("sz", &self.data.len())
            .field("pos", &self.pos)
            .field("borders", &self.borders)
            .finish()
    }
}

impl<'a> Record<'a> {
    /// The full (merged) payload
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The payload size
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The current position within the payload
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The number of payload bytes left to read
    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    /// The payload offsets at which each merged CONTINUE record starts
    pub fn borders(&self) -> &[usize] {
        &self.borders
    }

    /// Returns true if the cursor sits at the start of a CONTINUE payload
    pub fn at_border(&self) -> bool {
        self.borders.contains(&self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&[u8], ExcelError> {
        if len > self.available() {
            return Err(ExcelError::Format(format!(
                "{:?} record at offset {} is too short: {} bytes needed at position {}, {} available",
                self.ty,
                self.offset,
                len,
                self.pos,
                self.available()
            )));
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..self.pos])
    }

    /// Reads the next `len` bytes
    pub fn read_bytes(&mut self, len: usize) -> Result<&[u8], ExcelError> {
        self.take(len)
    }

    /// Skips `len` bytes
    pub fn skip(&mut self, len: usize) -> Result<(), ExcelError> {
        self.take(len).map(|_| ())
    }

    /// Reads a byte
    pub fn rdu8(&mut self) -> Result<u8, ExcelError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a little endian u16
    pub fn rdu16(&mut self) -> Result<u16, ExcelError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little endian u32
    pub fn rdu32(&mut self) -> Result<u32, ExcelError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little endian i32
    pub fn rdi32(&mut self) -> Result<i32, ExcelError> {
        Ok(self.rdu32()? as i32)
    }

    /// Reads a little endian IEEE-754 double
    pub fn rdf64(&mut self) -> Result<f64, ExcelError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(buf))
    }
}

/// A lazy reader of the BIFF records in a *Workbook* stream
///
/// Each call to [`next`](Self::next) yields a logical [`Record`]; the stream
/// can be repositioned at any record boundary with [`seek`](Self::seek)
pub struct RecordStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl fmt::Debug for RecordStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("pos", &self.pos)
            .field("size", &self.data.len())
            .finish()
    }
}

impl<'a> RecordStream<'a> {
    /// Creates a record stream over the *Workbook* stream bytes
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next record header
    pub fn offset(&self) -> u64 {
        self.pos as u64
    }

    /// Returns true when no records are left
    ///
    /// The stream ends when all bytes are consumed or when a zero record type
    /// is found (Excel pads the stream with zeroes after the last EOF)
    pub fn is_eof(&self) -> bool {
        match self.data.get(self.pos..self.pos + 2) {
            Some(b) => b == [0, 0],
            None => self.pos >= self.data.len(),
        }
    }

    fn header(&self, at: usize) -> Result<(u16, usize), ExcelError> {
        let b = self.data.get(at..at + 4).ok_or_else(|| {
            ExcelError::Format(format!(
                "Truncated record header at offset {} (stream size {})",
                at,
                self.data.len()
            ))
        })?;
        Ok((
            u16::from_le_bytes([b[0], b[1]]),
            usize::from(u16::from_le_bytes([b[2], b[3]])),
        ))
    }

    fn payload(&self, at: usize, size: usize) -> Result<&'a [u8], ExcelError> {
        let data: &'a [u8] = self.data;
        data.get(at + 4..at + 4 + size).ok_or_else(|| {
            ExcelError::Format(format!(
                "Record at offset {} declares {} bytes but only {} are left",
                at,
                size,
                data.len().saturating_sub(at + 4)
            ))
        })
    }

    /// Returns the type of the next record without consuming it
    pub fn peek_type(&self) -> Result<Option<RecordType>, ExcelError> {
        if self.is_eof() {
            return Ok(None);
        }
        let (code, _) = self.header(self.pos)?;
        Ok(Some(RecordType::new(code)))
    }

    /// Reads the next logical record, merging any following CONTINUE records
    ///
    /// Returns `None` at the end of the stream
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<Record<'a>>, ExcelError> {
        if self.is_eof() {
            return Ok(None);
        }
        let offset = self.pos;
        let (code, size) = self.header(offset)?;
        let mut data = Cow::Borrowed(self.payload(offset, size)?);
        let mut borders = Vec::new();
        self.pos = offset + 4 + size;
        while self.data.len() >= self.pos + 4 {
            let (code, size) = self.header(self.pos)?;
            if RecordType::new(code) != RecordType::Continue {
                break;
            }
            let fragment = self.payload(self.pos, size)?;
            borders.push(data.len());
            data.to_mut().extend_from_slice(fragment);
            self.pos += 4 + size;
        }
        let ty = RecordType::new(code);
        trace!(
            "Record {:?} (0x{:04x}) at offset {}: {} bytes, {} continuations",
            ty,
            code,
            offset,
            data.len(),
            borders.len()
        );
        Ok(Some(Record {
            ty,
            code,
            offset: offset as u64,
            data,
            borders,
            pos: 0,
        }))
    }

    /// Repositions the stream at the record starting at `offset`
    pub fn seek(&mut self, offset: u64) -> Result<(), ExcelError> {
        let pos = usize::try_from(offset)
            .ok()
            .filter(|pos| *pos < self.data.len())
            .ok_or_else(|| {
                ExcelError::Format(format!(
                    "Offset {} is outside the stream (size {})",
                    offset,
                    self.data.len()
                ))
            })?;
        self.pos = pos;
        Ok(())
    }

    /// Skips a nested substream whose BOF was just read, up to and including its EOF
    pub fn skip_substream(&mut self) -> Result<(), ExcelError> {
        let start = self.pos;
        let mut depth = 1;
        while depth > 0 {
            let record = self.next()?.ok_or_else(|| {
                ExcelError::Format(format!(
                    "Unterminated substream after offset {}",
                    start
                ))
            })?;
            match record.ty {
                RecordType::BOF => depth += 1,
                RecordType::EOF => depth -= 1,
                _ => {}
            }
        }
        debug!("Skipped nested substream {}..{}", start, self.pos);
        Ok(())
    }
}
