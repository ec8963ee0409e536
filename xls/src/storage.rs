//! Receivers of the decoded workbook content
//!
//! The parser does not build any model by itself: it announces what it decodes
//! to a [`Storage`]. [`Workbook`](crate::Workbook) is the in-memory
//! implementation used by [`open()`](crate::open) and friends; custom
//! implementations can stream cells elsewhere through
//! [`parse_reader()`](crate::workbook::parse_reader) or
//! [`parse_stream()`](crate::workbook::parse_stream)
use crate::{
    cell::CellValue,
    structures::{HSState, SheetType},
    workbook::DateMode,
    worksheet::SheetDimensions,
    ExcelError,
};

/// A sheet as listed in the workbook globals
#[derive(Debug, Clone, PartialEq)]
pub struct SheetProperties {
    /// The sheet name
    pub name: String,
    /// The sheet type
    pub sheet_type: SheetType,
    /// The sheet visibility
    pub visibility: HSState,
}

/// Receives the content of a workbook as its records are decoded
///
/// Callbacks come in stream order: the globals first (code page, date mode,
/// shared strings), then for each sheet [`on_sheet()`](Self::on_sheet)
/// followed by its dimensions and cells. Sheets are numbered from 0 in
/// workbook order.
///
/// Returning an error from a callback aborts the parse
pub trait Storage {
    /// The code page declared by the workbook
    fn on_codepage(&mut self, _codepage: u16) {}

    /// The date system of the workbook
    fn on_date_mode(&mut self, _mode: DateMode) {}

    /// The shared string table
    fn on_shared_strings(&mut self, _strings: &[String]) -> Result<(), ExcelError> {
        Ok(())
    }

    /// A new sheet starts; every following cell belongs to it
    fn on_sheet(&mut self, index: usize, properties: SheetProperties) -> Result<(), ExcelError>;

    /// The used range declared by the sheet at `index`
    fn on_dimensions(&mut self, _index: usize, _dimensions: SheetDimensions) {}

    /// A cell of the sheet at `index`
    ///
    /// Blank cells are reported as [`CellValue::Empty`]
    fn on_cell(
        &mut self,
        index: usize,
        row: u16,
        column: u16,
        value: CellValue,
    ) -> Result<(), ExcelError>;

    /// A non fatal problem, attached to the sheet at `index` or to the whole workbook
    fn on_anomaly(&mut self, _index: Option<usize>, _anomaly: String) {}
}
