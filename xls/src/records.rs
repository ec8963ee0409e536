//! *BIFF record* parsers
//!
//! Only the records needed to rebuild cell values are decoded: everything
//! else is identified by its [`RecordType`] and skipped
//!
//! Please refer to \[MS-XLS\] for documentation

pub mod from_record;
use crate::{structures::*, ExcelError, Record};
use from_record::*;
use from_record_derive::FromRecord;
use num_enum::FromPrimitive;
use tracing::{debug, warn};

macro_rules! check_record_type {
    ($record:expr, $($expected_record_type:pat_param)|+) => {
        if !matches!($record.ty, $($expected_record_type)|+) {
            return Err(format!(
                "Found unexpected record type {:x?}; should be {}",
                $record.ty,
                stringify!($($expected_record_type)|+)
            )
            .into());
        }
    };
}

/// Type of BIFF record
#[allow(clippy::upper_case_acronyms, missing_docs)]
#[repr(u16)]
#[derive(Debug, FromPrimitive, PartialEq, Eq, Clone, Copy)]
pub enum RecordType {
    Formula = 6,
    EOF = 10,
    RkLegacy = 126,
    Date1904 = 34,
    FilePass = 47,
    Continue = 60,
    CodePage = 66,
    Uncalced = 94,
    BoundSheet8 = 133,
    MulRk = 189,
    MulBlank = 190,
    SST = 252,
    LabelSst = 253,
    ExtSST = 255,
    Dimensions = 512,
    Blank = 513,
    Number = 515,
    Label = 516,
    BoolErr = 517,
    String = 519,
    Row = 520,
    Index = 523,
    Array = 545,
    Table = 566,
    RK = 638,
    ShrFmla = 1212,
    BOF = 2057,
    #[num_enum(default)]
    Unsupported = 0xffff,
}

impl RecordType {
    /// Maps a raw record type; unknown values map to [`RecordType::Unsupported`]
    pub fn new(code: u16) -> Self {
        Self::from_primitive(code)
    }
}

/// The BOF record specifies the beginning of the individual substreams as specified by the workbook section.
#[derive(Debug)]
pub struct Bof {
    /// specifies the BIFF version of the file.
    pub vers: u16,
    /// specifies the document type of the substream of records following this record.
    pub dt: BofType,
    /// specifies the build identifier.
    pub rup_build: u16,
    /// specifies the year when this BIFF version was first created.
    pub rup_year: u16,
}

impl Bof {
    /// The BIFF8 version number
    pub const BIFF8: u16 = 0x600;
}

impl FromRecord for Bof {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        debug!("Bof::from_record({record:?})");
        check_record_type!(record, RecordType::BOF);
        let vers = record.rdu16()?;
        let dt = BofType::from_record(record, anomalies)?;
        // Pre BIFF8 writers may omit the build information
        let (rup_build, rup_year) = if record.available() >= 4 {
            (record.rdu16()?, record.rdu16()?)
        } else {
            (0, 0)
        };
        if vers == Self::BIFF8 && rup_year != 0x7cc && rup_year != 0x7cd {
            anomalies.push(format!("Invalid BOF::rupYear {:x}", rup_year));
        }
        Ok(Self {
            vers,
            dt,
            rup_build,
            rup_year,
        })
    }
}

/// The BoundSheet8 record specifies basic information about a sheet.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::BoundSheet8)]
pub struct BoundSheet8 {
    /// specifies the stream position of the start of the BOF record for the sheet.
    pub lb_ply_pos: u32,
    /// Hidden state of the sheet.
    pub hs_state: HSState,
    /// Sheet type
    pub dt: SheetType,
    /// specifies the unique case-insensitive name of the sheet
    pub st_name: ShortXLUnicodeString,
}

/// The CodePage record specifies code page information for the workbook.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::CodePage)]
pub struct CodePage {
    /// workbook’s code page
    pub cv: u16,
}

/// The Date1904 record specifies the date system that the workbook uses.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::Date1904)]
pub struct Date1904 {
    /// 1 if the workbook uses the 1904 date system
    pub f_date1904: u16,
}

/// The Dimensions record specifies the used range of the sheet.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::Dimensions)]
pub struct Dimensions {
    /// First used row
    pub rw_mic: u32,
    /// One past the last used row
    pub rw_mac: u32,
    /// First used column
    pub col_mic: u16,
    /// One past the last used column
    pub col_mac: u16,
    /// Unused
    pub reserved: u16,
}

#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::EOF)]
#[allow(clippy::upper_case_acronyms, missing_docs)]
pub struct EOF {}

/// The SST record specifies string constants.
#[derive(Debug)]
#[allow(clippy::upper_case_acronyms)]
pub struct SST {
    /// Specifies the total number of references in the workbook to the strings in the shared string table.
    pub cst_total: u32,
    /// Specifies the number of unique strings in the shared string table.
    pub cst_unique: u32,
    /// The strings
    pub rgb: Vec<String>,
}

impl SST {
    /// Decodes the shared string table refusing more than `max_strings` entries
    pub fn from_record(
        record: &mut Record<'_>,
        anomalies: &mut Anomalies,
        max_strings: usize,
    ) -> Result<Self, ExcelError> {
        debug!("SST::from_record({record:?})");
        check_record_type!(record, RecordType::SST);
        let cst_total =
            u32::try_from(record.rdi32()?).map_err(|_| "cstTotal MUST be zero or greater")?;
        let cst_unique =
            u32::try_from(record.rdi32()?).map_err(|_| "cstUnique MUST be zero or greater")?;
        debug!("total: {cst_total}, unique: {cst_unique}");
        let count = usize::try_from(cst_unique)?;
        if count > max_strings {
            return Err(format!(
                "SST declares {count} strings, the limit is {max_strings}"
            )
            .into());
        }
        // Each string takes at least 3 bytes
        let mut rgb = Vec::<String>::with_capacity(count.min(record.available() / 3));
        while rgb.len() < count {
            let pos = record.position();
            let string = XLUnicodeRichExtendedString::from_record(record, anomalies).map_err(|e| {
                warn!(
                    "SST: Unable to load string at index={} (Record pos={}, size={})",
                    rgb.len(),
                    pos,
                    record.size()
                );
                e
            })?;
            rgb.push(string.into_string());
        }
        if record.available() > 0 {
            anomalies.push(format!(
                "SST: {} unused bytes after {} strings",
                record.available(),
                count
            ));
        }
        Ok(Self {
            cst_total,
            cst_unique,
            rgb,
        })
    }
}

/// The LabelSst record specifies a cell that contains a string.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::LabelSst)]
pub struct LabelSst {
    /// A Cell structure that specifies the cell.
    pub cell: Cell,
    /// specifies the zero-based index of an element in the shared string table
    pub isst: u32,
}

/// The Label record specifies a cell that contains a string.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::Label)]
pub struct Label {
    /// A Cell structure that specifies the cell.
    pub cell: Cell,
    /// The string in the cell
    pub st: XLUnicodeString,
}

/// The Number record specifies a cell that contains a floating-point number.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::Number)]
pub struct Number {
    /// A Cell structure that specifies the cell.
    pub cell: Cell,
    /// An Xnum value that specifies the cell value.
    pub num: f64,
}

/// The RK record specifies the numeric data contained in a single cell.
///
/// Also decoded from the older 0x007E record code
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::RK, RecordType::RkLegacy)]
#[allow(clippy::upper_case_acronyms)]
pub struct RK {
    /// Row index.
    pub rw: u16,
    /// Column index.
    pub col: u16,
    /// Numeric data for a single cell.
    pub rkrec: RkRec,
}

/// The MulRk record specifies a series of cells with numeric data in a sheet row.
#[derive(Debug)]
pub struct MulRk {
    /// specifies the row containing the cells with numeric data.
    pub rw: u16,
    /// specifies the first column in the series of numeric cells within the sheet.
    pub col_first: u16,
    /// An array of RkRec structures.
    pub rgrkrec: Vec<RkRec>,
    /// specifies the last column in the set of numeric cells within the sheet.
    pub col_last: u16,
}

impl FromRecord for MulRk {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        check_record_type!(record, RecordType::MulRk);
        let rw = record.rdu16()?;
        let col_first = record.rdu16()?;
        let mut rgrkrec = Vec::<RkRec>::new();
        while record.available() > 2 {
            rgrkrec.push(RkRec::from_record(record, anomalies)?);
        }
        let col_last = record.rdu16()?;
        if usize::from(col_last) < usize::from(col_first)
            || usize::from(col_last - col_first) + 1 != rgrkrec.len()
        {
            return Err(format!(
                "MulRk: {} values do not fit columns {}..={}",
                rgrkrec.len(),
                col_first,
                col_last
            )
            .into());
        }
        Ok(Self {
            rw,
            col_first,
            rgrkrec,
            col_last,
        })
    }
}

/// The Blank record specifies an empty cell with no formula or value.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::Blank)]
pub struct Blank {
    /// A Cell structure that specifies the cell.
    pub cell: Cell,
}

/// The MulBlank record specifies a series of blank cells in a sheet row.
#[derive(Debug)]
pub struct MulBlank {
    /// specifies the row containing the blank cells.
    pub rw: u16,
    /// specifies the first column in the series of blank cells.
    pub col_first: u16,
    /// The XF indexes of the cells
    pub rgixfe: Vec<u16>,
    /// specifies the last column in the series of blank cells.
    pub col_last: u16,
}

impl FromRecord for MulBlank {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        check_record_type!(record, RecordType::MulBlank);
        let rw = record.rdu16()?;
        let col_first = record.rdu16()?;
        let mut rgixfe = Vec::<u16>::new();
        while record.available() > 2 {
            rgixfe.push(record.rdu16()?);
        }
        let col_last = record.rdu16()?;
        if col_last < col_first || usize::from(col_last - col_first) + 1 != rgixfe.len() {
            anomalies.push(format!(
                "MulBlank: {} cells do not fit columns {}..={}",
                rgixfe.len(),
                col_first,
                col_last
            ));
        }
        Ok(Self {
            rw,
            col_first,
            rgixfe,
            col_last,
        })
    }
}

/// The BoolErr record specifies a cell that contains either a Boolean value or an error value.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::BoolErr)]
pub struct BoolErr {
    /// A Cell structure that specifies the cell.
    pub cell: Cell,
    /// A Bes structure that specifies a Boolean or an error value.
    pub bes: Bes,
}

/// The Formula record specifies a formula for a cell.
///
/// The parsed expression is not decoded
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::Formula)]
pub struct Formula {
    /// A Cell structure that specifies the cell.
    pub cell: Cell,
    /// A FormulaValue structure that specifies the value of the formula.
    pub val: FormulaValue,
}

/// The String record specifies the string value of a formula.
#[derive(Debug, FromRecord)]
#[from_record(Record, RecordType::String)]
pub struct StringR {
    /// The string value
    pub string: XLUnicodeString,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::RecordStream;

    fn record(code: u16, payload: &[u8]) -> Vec<u8> {
        let mut v = code.to_le_bytes().to_vec();
        v.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        v.extend_from_slice(payload);
        v
    }

    fn mulrk_payload(row: u16, first: u16, values: &[u32], last: u16) -> Vec<u8> {
        let mut v = row.to_le_bytes().to_vec();
        v.extend_from_slice(&first.to_le_bytes());
        for rk in values {
            v.extend_from_slice(&15u16.to_le_bytes());
            v.extend_from_slice(&rk.to_le_bytes());
        }
        v.extend_from_slice(&last.to_le_bytes());
        v
    }

    #[test]
    fn record_types() {
        assert_eq!(RecordType::new(0x0809), RecordType::BOF);
        assert_eq!(RecordType::new(0x00bd), RecordType::MulRk);
        assert_eq!(RecordType::new(0x027e), RecordType::RK);
        assert_eq!(RecordType::new(0x007e), RecordType::RkLegacy);
        assert_eq!(RecordType::new(0x1234), RecordType::Unsupported);
    }

    #[test]
    fn mulrk() -> Result<(), ExcelError> {
        let values = [(1 << 2) | 2, (2 << 2) | 2, (300 << 2) | 3];
        let data = record(0x00bd, &mulrk_payload(5, 2, &values, 4));
        let mut r = RecordStream::new(&data).next()?.unwrap();
        let mulrk = MulRk::from_record(&mut r, &mut Anomalies::new())?;
        assert_eq!(mulrk.rw, 5);
        let decoded: Vec<f64> = mulrk.rgrkrec.iter().map(|r| r.rk.value()).collect();
        assert_eq!(decoded, [1.0, 2.0, 3.0]);

        let data = record(0x00bd, &mulrk_payload(5, 2, &values, 5));
        let mut r = RecordStream::new(&data).next()?.unwrap();
        assert!(MulRk::from_record(&mut r, &mut Anomalies::new())
            .unwrap_err()
            .is_format_error());
        Ok(())
    }

    #[test]
    fn wrong_record_type() -> Result<(), ExcelError> {
        let data = record(0x0203, &[0u8; 14]);
        let mut r = RecordStream::new(&data).next()?.unwrap();
        let err = LabelSst::from_record(&mut r, &mut Anomalies::new()).unwrap_err();
        assert!(err.is_format_error());
        let mut r = RecordStream::new(&data).next()?.unwrap();
        let n = Number::from_record(&mut r, &mut Anomalies::new())?;
        assert_eq!(n.num, 0.0);
        let mut r = RecordStream::new(&data).next()?.unwrap();
        assert!(RK::from_record(&mut r, &mut Anomalies::new())
            .unwrap_err()
            .is_format_error());
        Ok(())
    }

    #[test]
    fn rk_record_codes() -> Result<(), ExcelError> {
        let mut payload = 3u16.to_le_bytes().to_vec();
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&15u16.to_le_bytes());
        payload.extend_from_slice(&((7u32 << 2) | 2).to_le_bytes());
        for code in [0x027e, 0x007e] {
            let data = record(code, &payload);
            let mut r = RecordStream::new(&data).next()?.unwrap();
            let rk = RK::from_record(&mut r, &mut Anomalies::new())?;
            assert_eq!((rk.rw, rk.col), (3, 1));
            assert_eq!(rk.rkrec.rk.value(), 7.0);
        }
        Ok(())
    }

    #[test]
    fn sst_limit() -> Result<(), ExcelError> {
        let mut payload = 2u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&2u32.to_le_bytes());
        payload.extend_from_slice(&[1, 0, 0, b'a', 1, 0, 0, b'b']);
        let data = record(0x00fc, &payload);
        let mut r = RecordStream::new(&data).next()?.unwrap();
        let mut anomalies = Anomalies::new();
        let sst = SST::from_record(&mut r, &mut anomalies, 10)?;
        assert_eq!(sst.rgb, ["a", "b"]);
        assert!(anomalies.is_empty());

        let mut r = RecordStream::new(&data).next()?.unwrap();
        assert!(SST::from_record(&mut r, &mut anomalies, 1)
            .unwrap_err()
            .is_format_error());

        let mut payload = 3u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&[1, 0, 0, b'a']);
        let data = record(0x00fc, &payload);
        let mut r = RecordStream::new(&data).next()?.unwrap();
        assert!(SST::from_record(&mut r, &mut anomalies, 10)
            .unwrap_err()
            .is_format_error());
        Ok(())
    }
}
