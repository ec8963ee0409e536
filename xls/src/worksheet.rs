//! *Worksheet* associated structures
use crate::{
    cell::{Cell, CellValue},
    config::Config,
    records::{
        from_record::{Anomalies, FromRecord},
        Blank, Bof, BoolErr, Dimensions, Formula, Label, LabelSst, MulBlank, MulRk, Number,
        RecordType, StringR, RK,
    },
    storage::{SheetProperties, Storage},
    structures::{BofType, FormulaValue, HSState, SheetType},
    ExcelError, RecordStream,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

static EMPTY: CellValue = CellValue::Empty;

/// Sheet locator
#[derive(Debug, Clone)]
pub(crate) struct SheetInfo {
    pub(crate) offset: u64,
    pub(crate) properties: SheetProperties,
}

/// The used range declared by a sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetDimensions {
    /// First used row
    pub first_row: u32,
    /// One past the last used row
    pub last_row: u32,
    /// First used column
    pub first_column: u16,
    /// One past the last used column
    pub last_column: u16,
}

impl SheetDimensions {
    /// Rows in a BIFF8 sheet
    pub const MAX_ROWS: u32 = 0x10000;
    /// Columns in a BIFF8 sheet
    pub const MAX_COLUMNS: u16 = 0x100;

    /// Returns true if the range is ordered and fits in a BIFF8 sheet
    pub fn is_valid(&self) -> bool {
        self.first_row <= self.last_row
            && self.first_column <= self.last_column
            && self.last_row <= Self::MAX_ROWS
            && self.last_column <= Self::MAX_COLUMNS
    }
}

/// *Worksheet*
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    sheet_type: SheetType,
    visibility: HSState,
    dimensions: Option<SheetDimensions>,
    cells: BTreeMap<(u16, u16), CellValue>,
    anomalies: Anomalies,
}

impl Worksheet {
    pub(crate) fn new(properties: SheetProperties) -> Self {
        Self {
            name: properties.name,
            sheet_type: properties.sheet_type,
            visibility: properties.visibility,
            dimensions: None,
            cells: BTreeMap::new(),
            anomalies: Anomalies::new(),
        }
    }

    pub(crate) fn set_dimensions(&mut self, dimensions: SheetDimensions) {
        self.dimensions = Some(dimensions);
    }

    /// Stores a cell; an empty value never replaces an existing one
    pub(crate) fn store(&mut self, row: u16, column: u16, value: CellValue) {
        if value.is_empty() {
            self.cells.entry((row, column)).or_default();
            return;
        }
        if let Some(old) = self.cells.insert((row, column), value) {
            if !old.is_empty() {
                self.anomalies.push(format!(
                    "Sheet \"{}\": cell ({row}, {column}) is defined more than once",
                    self.name
                ));
            }
        }
    }

    pub(crate) fn push_anomaly(&mut self, anomaly: String) {
        self.anomalies.push(anomaly);
    }

    /// The sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sheet type
    pub fn sheet_type(&self) -> SheetType {
        self.sheet_type
    }

    /// The sheet visibility
    pub fn visibility(&self) -> HSState {
        self.visibility
    }

    /// The used range declared in the Dimensions record
    pub fn dimensions(&self) -> Option<SheetDimensions> {
        self.dimensions
    }

    /// Returns the cell at the given position, [`CellValue::Empty`] if absent
    pub fn cell(&self, row: u16, column: u16) -> Cell {
        Cell {
            row,
            column,
            value: self.value(row, column).clone(),
        }
    }

    /// Returns the value at the given position, [`CellValue::Empty`] if absent
    pub fn value(&self, row: u16, column: u16) -> &CellValue {
        self.cells.get(&(row, column)).unwrap_or(&EMPTY)
    }

    /// Iterates over the stored cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.cells.iter().map(|(&(row, column), value)| Cell {
            row,
            column,
            value: value.clone(),
        })
    }

    /// The number of stored cells
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// One past the last used row, from Dimensions or the stored cells
    pub fn row_count(&self) -> u32 {
        let declared = self.dimensions.map(|d| d.last_row);
        self.stored_rows().max(declared).unwrap_or(0)
    }

    /// One past the last used column, from Dimensions or the stored cells
    pub fn column_count(&self) -> u32 {
        let declared = self.dimensions.map(|d| u32::from(d.last_column));
        self.stored_columns().max(declared).unwrap_or(0)
    }

    /// One past the last row holding a stored cell
    pub fn stored_rows(&self) -> Option<u32> {
        self.cells.keys().next_back().map(|&(row, _)| u32::from(row) + 1)
    }

    /// One past the last column holding a stored cell
    pub fn stored_columns(&self) -> Option<u32> {
        self.cells.keys().map(|&(_, col)| u32::from(col) + 1).max()
    }

    /// Problems encountered while parsing the sheet
    pub fn anomalies(&self) -> &[String] {
        &self.anomalies
    }
}

/// Decodes the sheet substream starting at the current stream position
///
/// The sheet is announced to `storage` as number `index`, followed by its cells
pub(crate) fn read_sheet<S: Storage + ?Sized>(
    stream: &mut RecordStream<'_>,
    index: usize,
    info: SheetInfo,
    shared_strings: Option<&[String]>,
    config: &Config,
    storage: &mut S,
) -> Result<(), ExcelError> {
    let name = info.properties.name.clone();
    let sheet_type = info.properties.sheet_type;
    storage.on_sheet(index, info.properties)?;
    let mut anomalies = Anomalies::new();
    let mut record = stream
        .next()?
        .ok_or_else(|| format!("Sheet \"{name}\": missing BOF"))?;
    if record.ty != RecordType::BOF {
        return Err(format!(
            "Sheet \"{}\": expected a BOF record at offset {}, found {:?}",
            name, info.offset, record.ty
        )
        .into());
    }
    let bof = Bof::from_record(&mut record, &mut anomalies)?;
    let expected = match sheet_type {
        SheetType::DialogOrWorksheet => Some(BofType::DialogOrWorksheet),
        SheetType::MacroSheet => Some(BofType::MacroSheet),
        SheetType::ChartSheet => Some(BofType::ChartSheet),
        _ => None,
    };
    if expected.is_some_and(|dt| dt != bof.dt) {
        anomalies.push(format!(
            "Sheet \"{}\": BOF type {:?} does not match sheet type {:?}",
            name, bof.dt, sheet_type
        ));
    }

    let mut cells = CellEmitter {
        storage,
        index,
        name: &name,
        emitted: 0,
        max_cells: config.max_cells_per_sheet,
    };
    loop {
        let mut record = stream
            .next()?
            .ok_or_else(|| format!("Sheet \"{name}\": missing EOF record"))?;
        match record.ty {
            RecordType::EOF => break,
            RecordType::BOF => stream.skip_substream()?,
            RecordType::Dimensions => {
                let v = Dimensions::from_record(&mut record, &mut anomalies)?;
                let dimensions = SheetDimensions {
                    first_row: v.rw_mic,
                    last_row: v.rw_mac,
                    first_column: v.col_mic,
                    last_column: v.col_mac,
                };
                if dimensions.is_valid() {
                    cells.storage.on_dimensions(index, dimensions);
                } else {
                    warn!("Sheet \"{name}\": invalid dimensions {dimensions:?}");
                    anomalies.push(format!(
                        "Sheet \"{name}\": ignoring invalid dimensions {dimensions:?}"
                    ));
                }
            }
            RecordType::Number => {
                let v = Number::from_record(&mut record, &mut anomalies)?;
                cells.emit(v.cell.rw, v.cell.col, CellValue::Number(v.num))?;
            }
            RecordType::RK | RecordType::RkLegacy => {
                let v = RK::from_record(&mut record, &mut anomalies)?;
                cells.emit(v.rw, v.col, CellValue::Number(v.rkrec.rk.value()))?;
            }
            RecordType::MulRk => {
                let v = MulRk::from_record(&mut record, &mut anomalies)?;
                for (col, rkrec) in (v.col_first..=v.col_last).zip(v.rgrkrec.iter()) {
                    cells.emit(v.rw, col, CellValue::Number(rkrec.rk.value()))?;
                }
            }
            RecordType::BoolErr => {
                let v = BoolErr::from_record(&mut record, &mut anomalies)?;
                cells.emit(v.cell.rw, v.cell.col, v.bes.into())?;
            }
            RecordType::LabelSst => {
                let v = LabelSst::from_record(&mut record, &mut anomalies)?;
                let sst = shared_strings.ok_or_else(|| {
                    format!("Sheet \"{name}\": LabelSst found but the workbook has no SST")
                })?;
                let text = usize::try_from(v.isst)
                    .ok()
                    .and_then(|i| sst.get(i))
                    .ok_or_else(|| {
                        format!(
                            "Sheet \"{}\": shared string index {} is out of range (SST size {})",
                            name,
                            v.isst,
                            sst.len()
                        )
                    })?;
                cells.emit(v.cell.rw, v.cell.col, CellValue::Text(text.clone()))?;
            }
            RecordType::Label => {
                let v = Label::from_record(&mut record, &mut anomalies)?;
                cells.emit(v.cell.rw, v.cell.col, CellValue::Text(v.st.into_string()))?;
            }
            RecordType::Blank => {
                let v = Blank::from_record(&mut record, &mut anomalies)?;
                cells.emit(v.cell.rw, v.cell.col, CellValue::Empty)?;
            }
            RecordType::MulBlank => {
                let v = MulBlank::from_record(&mut record, &mut anomalies)?;
                for col in (v.col_first..=v.col_last).take(v.rgixfe.len()) {
                    cells.emit(v.rw, col, CellValue::Empty)?;
                }
            }
            RecordType::Formula => {
                let v = Formula::from_record(&mut record, &mut anomalies)?;
                let string = if v.val == FormulaValue::String {
                    Some(formula_string(stream, &mut anomalies)?)
                } else {
                    None
                };
                cells.emit(v.cell.rw, v.cell.col, CellValue::from_formula(v.val, string))?;
            }
            RecordType::String => {
                anomalies.push(format!(
                    "Sheet \"{}\": String record at offset {} does not follow a formula",
                    name, record.offset
                ));
            }
            _ => {}
        }
    }
    debug!("Sheet \"{}\": {} cells decoded", name, cells.emitted);
    for anomaly in anomalies {
        cells.storage.on_anomaly(Some(index), anomaly);
    }
    Ok(())
}

/// Forwards decoded cells to a [`Storage`] enforcing the per sheet limit
struct CellEmitter<'a, S: ?Sized> {
    storage: &'a mut S,
    index: usize,
    name: &'a str,
    emitted: usize,
    max_cells: usize,
}

impl<S: Storage + ?Sized> CellEmitter<'_, S> {
    fn emit(&mut self, row: u16, column: u16, value: CellValue) -> Result<(), ExcelError> {
        if self.emitted >= self.max_cells {
            return Err(format!(
                "Sheet \"{}\" has more than {} cells",
                self.name, self.max_cells
            )
            .into());
        }
        self.emitted += 1;
        self.storage.on_cell(self.index, row, column, value)
    }
}

/// Reads the String record holding the cached string result of a formula
fn formula_string(
    stream: &mut RecordStream<'_>,
    anomalies: &mut Anomalies,
) -> Result<String, ExcelError> {
    loop {
        match stream.peek_type()? {
            Some(RecordType::String) => {
                let mut record = stream.next()?.ok_or("Missing String record")?;
                return Ok(StringR::from_record(&mut record, anomalies)?
                    .string
                    .into_string());
            }
            Some(RecordType::ShrFmla | RecordType::Array | RecordType::Table | RecordType::Uncalced) => {
                stream.next()?;
            }
            other => {
                return Err(format!(
                    "Missing String record after a string formula at offset {} (found {:?})",
                    stream.offset(),
                    other
                )
                .into());
            }
        }
    }
}
