//! Typed cell values
use crate::structures::{Bes, FormulaValue};
use std::fmt;

/// Error value stored in a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellError {
    /// `#NULL!`
    Null,
    /// `#DIV/0!`
    Div0,
    /// `#VALUE!`
    Value,
    /// `#REF!`
    Ref,
    /// `#NAME?`
    Name,
    /// `#NUM!`
    Num,
    /// `#N/A`
    NA,
    /// `#GETTING_DATA`
    GettingData,
    /// An error code not defined by the format
    Unknown(u8),
}

impl CellError {
    /// Maps a BErr code to its error
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => CellError::Null,
            0x07 => CellError::Div0,
            0x0F => CellError::Value,
            0x17 => CellError::Ref,
            0x1D => CellError::Name,
            0x24 => CellError::Num,
            0x2A => CellError::NA,
            0x2B => CellError::GettingData,
            x => CellError::Unknown(x),
        }
    }

    /// The BErr code of the error
    pub fn code(&self) -> u8 {
        match self {
            CellError::Null => 0x00,
            CellError::Div0 => 0x07,
            CellError::Value => 0x0F,
            CellError::Ref => 0x17,
            CellError::Name => 0x1D,
            CellError::Num => 0x24,
            CellError::NA => 0x2A,
            CellError::GettingData => 0x2B,
            CellError::Unknown(x) => *x,
        }
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::Null => f.write_str("#NULL!"),
            CellError::Div0 => f.write_str("#DIV/0!"),
            CellError::Value => f.write_str("#VALUE!"),
            CellError::Ref => f.write_str("#REF!"),
            CellError::Name => f.write_str("#NAME?"),
            CellError::Num => f.write_str("#NUM!"),
            CellError::NA => f.write_str("#N/A"),
            CellError::GettingData => f.write_str("#GETTING_DATA"),
            CellError::Unknown(x) => write!(f, "UNSUPPORTED_ERROR(0x{x:02x})"),
        }
    }
}

/// The cached result of a formula
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaResult {
    /// Number
    Number(f64),
    /// String
    Text(String),
    /// Boolean
    Boolean(bool),
    /// Error
    Error(CellError),
    /// Empty result
    Empty,
}

impl fmt::Display for FormulaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaResult::Number(n) => write!(f, "{n}"),
            FormulaResult::Text(s) => f.write_str(s),
            FormulaResult::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            FormulaResult::Error(e) => write!(f, "{e}"),
            FormulaResult::Empty => Ok(()),
        }
    }
}

/// The value of a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// No value
    #[default]
    Empty,
    /// Number (dates included)
    Number(f64),
    /// String
    Text(String),
    /// Boolean
    Boolean(bool),
    /// Error
    Error(CellError),
    /// Cached result of a formula
    Formula(FormulaResult),
}

impl CellValue {
    /// Returns true if the cell holds no value
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Returns the numeric value of the cell, formula results included
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) | CellValue::Formula(FormulaResult::Number(n)) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text of the cell, formula results included
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::Formula(FormulaResult::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn from_formula(val: FormulaValue, string: Option<String>) -> Self {
        CellValue::Formula(match val {
            FormulaValue::Xnum(n) => FormulaResult::Number(n),
            FormulaValue::String => FormulaResult::Text(string.unwrap_or_default()),
            FormulaValue::Boolean(b) => FormulaResult::Boolean(b),
            FormulaValue::Error(e) => FormulaResult::Error(e),
            FormulaValue::Blank => FormulaResult::Empty,
        })
    }
}

impl From<Bes> for CellValue {
    fn from(bes: Bes) -> Self {
        match bes {
            Bes::Boolean(b) => CellValue::Boolean(b),
            Bes::Error(e) => CellValue::Error(e),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            CellValue::Error(e) => write!(f, "{e}"),
            CellValue::Formula(r) => write!(f, "{r}"),
        }
    }
}

/// A cell with its position
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Zero-based row index
    pub row: u16,
    /// Zero-based column index
    pub column: u16,
    /// Cell value
    pub value: CellValue,
}
