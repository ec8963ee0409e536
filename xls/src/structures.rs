//! Excel structures embedded in record payloads
use crate::{
    cell::CellError,
    records::from_record::{Anomalies, FromRecord},
    ExcelError, Record,
};
use from_record_derive::FromRecord;
use std::fmt;
use tracing::debug;

/// Boolean or error
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bes {
    /// Boolean value
    Boolean(bool),
    /// Error value
    Error(CellError),
}

impl fmt::Display for Bes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bes::Boolean(bool) => write!(f, "{}", bool),
            Bes::Error(error) => write!(f, "{}", error),
        }
    }
}

impl FromRecord for Bes {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        let bool_err = record.rdu8()?;
        let f_error = record.rdu8()?;

        if f_error == 0 {
            if bool_err > 1 {
                anomalies.push(format!("Bes: Invalid boolean value 0x{:x}", bool_err));
            }
            Ok(Bes::Boolean(bool_err != 0))
        } else {
            if f_error > 1 {
                anomalies.push(format!("Bes: Invalid f_error value 0x{:x}", f_error));
            }
            let err = CellError::from_code(bool_err);
            if let CellError::Unknown(code) = err {
                anomalies.push(format!("Bes: Invalid error value 0x{:x}", code));
            }
            Ok(Bes::Error(err))
        }
    }
}

/// Type of BOF
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BofType {
    /// Workbook globals
    Workbook,
    /// Dialog or Worksheet
    DialogOrWorksheet,
    /// Chartsheet
    ChartSheet,
    /// Macrosheet
    MacroSheet,
    /// Fallback for invalid values
    Invalid(u16),
}

impl FromRecord for BofType {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        Ok(match record.rdu16()? {
            0x05 => BofType::Workbook,
            0x10 => BofType::DialogOrWorksheet,
            0x20 => BofType::ChartSheet,
            0x40 => BofType::MacroSheet,
            x => {
                anomalies.push(format!("Invalid BOF::dt {x:x}"));
                BofType::Invalid(x)
            }
        })
    }
}

/// A cell in a sheet
#[derive(Debug, FromRecord)]
#[from_record(Struct)]
pub struct Cell {
    /// Zero-based row index
    pub rw: u16,
    /// Zero-based column index
    pub col: u16,
    /// Zero-based index of a XF record
    pub ixfe: u16,
}

/// Cached value of a formula
#[derive(Debug, PartialEq)]
pub enum FormulaValue {
    /// Number
    Xnum(f64),
    /// String, stored in the String record following the formula
    String,
    /// Boolean
    Boolean(bool),
    /// Error
    Error(CellError),
    /// Empty
    Blank,
}

impl FromRecord for FormulaValue {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        let bytes = record.read_bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        if raw[6..8] != [0xff, 0xff] {
            return Ok(FormulaValue::Xnum(f64::from_le_bytes(raw)));
        }
        match raw[0] {
            0x00 => Ok(FormulaValue::String),
            0x01 => Ok(FormulaValue::Boolean(raw[2] != 0)),
            0x02 => {
                let err = CellError::from_code(raw[2]);
                if let CellError::Unknown(code) = err {
                    anomalies.push(format!("FormulaValue: Invalid error value 0x{:x}", code));
                }
                Ok(FormulaValue::Error(err))
            }
            0x03 => Ok(FormulaValue::Blank),
            other => Err(format!("FormulaValue: Invalid byte1 value 0x{other:02x}").into()),
        }
    }
}

/// Numeric value in the compressed RK format
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RkNumber {
    f_x100: bool,
    num: RkNumberValue,
}

impl RkNumber {
    /// Unpacks a raw RK value
    ///
    /// Bit 0 requests a division by 100, bit 1 selects a signed 30-bit
    /// integer instead of the 30 most significant bits of a double
    pub fn new(rk: u32) -> Self {
        let f_x100 = rk & 1 != 0;
        let f_int = rk & (1 << 1) != 0;
        let num = if f_int {
            RkNumberValue::Int((rk as i32) >> 2)
        } else {
            RkNumberValue::Float(f64::from_bits(u64::from(rk & 0xfffffffc) << 32))
        };
        RkNumber { f_x100, num }
    }

    /// The decoded number
    pub fn value(&self) -> f64 {
        let num = match self.num {
            RkNumberValue::Int(int) => f64::from(int),
            RkNumberValue::Float(float) => float,
        };
        if self.f_x100 {
            num / 100.0
        } else {
            num
        }
    }
}

impl fmt::Display for RkNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromRecord for RkNumber {
    fn from_record(record: &mut Record<'_>, _anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        Ok(RkNumber::new(record.rdu32()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RkNumberValue {
    Int(i32),
    Float(f64),
}

/// Numeric data in application-specific format
#[derive(Debug, FromRecord)]
#[from_record(Struct)]
pub struct RkRec {
    /// An IXFCell that specifies the format of the numeric value.
    pub ixfe: u16,
    /// Specifies the numeric value.
    pub rk: RkNumber,
}

/// Hidden state of a sheet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HSState {
    /// Visible
    Visible,
    /// Hidden
    Hidden,
    /// Only visible through VBA
    VeryHidden,
    /// Fallback for invalid value
    Invalid(u8),
}

impl FromRecord for HSState {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        let misc = record.rdu8()?;
        if misc & 0xfc != 0 {
            anomalies.push("HSState: Invalid reserved value".to_string());
        }
        Ok(match misc & 0x03 {
            0 => HSState::Visible,
            1 => HSState::Hidden,
            2 => HSState::VeryHidden,
            other => HSState::Invalid(other),
        })
    }
}

impl fmt::Display for HSState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HSState::Visible => write!(f, "visible"),
            HSState::Hidden => write!(f, "hidden"),
            HSState::VeryHidden => write!(f, "veryHidden"),
            HSState::Invalid(v) => write!(f, "invalid({v})"),
        }
    }
}

/// Type of sheet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetType {
    /// Dialog or Worksheet
    DialogOrWorksheet,
    /// Macrosheet
    MacroSheet,
    /// Chartsheet
    ChartSheet,
    /// VBA Module
    VbaModule,
    /// Fallback for invalid value
    Invalid(u8),
}

impl FromRecord for SheetType {
    fn from_record(record: &mut Record<'_>, _anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        Ok(match record.rdu8()? {
            0x00 => SheetType::DialogOrWorksheet,
            0x01 => SheetType::MacroSheet,
            0x02 => SheetType::ChartSheet,
            0x06 => SheetType::VbaModule,
            other => SheetType::Invalid(other),
        })
    }
}

fn xl_unicode_to_string(rgb: &[u8]) -> String {
    encoding_rs::UTF_16LE
        .decode_without_bom_handling(rgb)
        .0
        .into_owned()
}

/// Reads `cch` characters, restarting with an option byte at each CONTINUE border
fn read_xl_chars(
    record: &mut Record<'_>,
    cch: usize,
    mut f_high_byte: bool,
) -> Result<String, ExcelError> {
    let mut rgb = Vec::<u8>::with_capacity(2 * cch.min(record.available()));
    for _ in 0..cch {
        if record.at_border() {
            let misc = record.rdu8()?;
            f_high_byte = misc & 0x01 != 0;
        }
        if f_high_byte {
            rgb.extend_from_slice(record.read_bytes(2)?);
        } else {
            rgb.push(record.rdu8()?);
            rgb.push(0);
        }
    }
    Ok(xl_unicode_to_string(&rgb))
}

/// A Unicode string with an 8-bit character count
#[derive(Debug, Clone)]
pub struct ShortXLUnicodeString {
    string: String,
}

impl ShortXLUnicodeString {
    /// The decoded string
    pub fn as_str(&self) -> &str {
        &self.string
    }
}

impl fmt::Display for ShortXLUnicodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl FromRecord for ShortXLUnicodeString {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        let cch = record.rdu8()?;
        let misc = record.rdu8()?;
        if misc & 0xFE != 0 {
            anomalies.push("ShortXLUnicodeString: Invalid reserved value".to_string());
        }
        let string = read_xl_chars(record, usize::from(cch), misc & 0x01 != 0)?;
        Ok(Self { string })
    }
}

/// A Unicode string with a 16-bit character count
#[derive(Debug, Clone)]
pub struct XLUnicodeString {
    string: String,
}

impl XLUnicodeString {
    /// Consumes the structure returning the decoded string
    pub fn into_string(self) -> String {
        self.string
    }
}

impl fmt::Display for XLUnicodeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl FromRecord for XLUnicodeString {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        let cch = record.rdu16()?;
        let misc = record.rdu8()?;
        if misc & 0xFE != 0 {
            anomalies.push("XLUnicodeString: Invalid reserved1 bit value".to_string());
        }
        let string = read_xl_chars(record, usize::from(cch), misc & 0x01 != 0)?;
        Ok(Self { string })
    }
}

/// A Unicode string which can contain formatting information and phonetic string data
///
/// Only the characters are kept: formatting runs and phonetic data are
/// skipped by their declared length
#[derive(Debug, Clone)]
pub struct XLUnicodeRichExtendedString {
    string: String,
}

impl XLUnicodeRichExtendedString {
    /// Consumes the structure returning the decoded string
    pub fn into_string(self) -> String {
        self.string
    }
}

impl fmt::Display for XLUnicodeRichExtendedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string)
    }
}

impl FromRecord for XLUnicodeRichExtendedString {
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        let cch = record.rdu16()?;
        let misc = record.rdu8()?;
        let f_high_byte = misc & 0x01 != 0;
        if misc & 0x02 != 0 {
            anomalies.push("XLUnicodeRichExtendedString: Invalid reserved1 bit value".to_string());
        }
        let f_ext_st = misc & 0x04 != 0;
        let f_rich_st = misc & 0x08 != 0;
        if misc & 0xF0 != 0 {
            anomalies.push(format!(
                "XLUnicodeRichExtendedString: Invalid reserved2 value 0x{:x}",
                misc >> 4
            ));
        }
        let c_run = if f_rich_st { record.rdu16()? } else { 0 };
        let cb_ext_rst = if f_ext_st {
            usize::try_from(record.rdi32()?)
                .map_err(|_| "XLUnicodeRichExtendedString: negative cbExtRst")?
        } else {
            0
        };
        let string = read_xl_chars(record, usize::from(cch), f_high_byte)?;
        let size_of_format_run = 4;
        record.skip(usize::from(c_run) * size_of_format_run + cb_ext_rst)?;
        debug!(
            "XLUnicodeRichExtendedString: cch={cch} runs={c_run} ext={cb_ext_rst} pos={}",
            record.position()
        );
        Ok(Self { string })
    }
}
