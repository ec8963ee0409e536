use std::{io, num::TryFromIntError};
use thiserror::Error;

/// Errors reported while reading a workbook
#[derive(Error, Debug)]
pub enum ExcelError {
    /// The file is structurally invalid: the whole parse is aborted
    #[error("invalid workbook format: {0}")]
    Format(String),

    /// The requested sheet or stream does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The underlying reader failed
    #[error("IO error: {0}")]
    Io(io::Error),

    /// A configuration parameter is out of its allowed range
    #[error("config parameter `{parameter}` value is out of bounds: {message}")]
    ConfigParameterValue {
        /// Parameter name
        parameter: &'static str,
        /// Error message
        message: String,
    },

    /// The configuration could not be loaded
    #[error("config deserialization: {0}")]
    ConfigDeserialization(#[from] Box<figment::Error>),
}

impl ExcelError {
    /// Returns true if the error is related to an invalid data format
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    /// Returns true if the error is a failed lookup
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<io::Error> for ExcelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                Self::Format(e.to_string())
            }
            io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            _ => Self::Io(e),
        }
    }
}

impl From<figment::Error> for ExcelError {
    fn from(e: figment::Error) -> Self {
        Box::new(e).into()
    }
}

impl From<&str> for ExcelError {
    fn from(s: &str) -> Self {
        Self::Format(s.to_string())
    }
}

impl From<String> for ExcelError {
    fn from(s: String) -> Self {
        Self::Format(s)
    }
}

impl From<TryFromIntError> for ExcelError {
    fn from(e: TryFromIntError) -> Self {
        Self::Format(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn io_error_mapping() {
        let e: ExcelError = io::Error::new(io::ErrorKind::InvalidData, "bad").into();
        assert!(e.is_format_error());
        let e: ExcelError = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert!(e.is_format_error());
        let e: ExcelError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(e.is_not_found());
        let e: ExcelError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(e, ExcelError::Io(_)));
        assert!(!e.is_format_error() && !e.is_not_found());
    }

    #[test]
    fn string_conversions() {
        let e: ExcelError = "broken".into();
        assert_eq!(e.to_string(), "invalid workbook format: broken");
        let e: ExcelError = u16::try_from(70000u32).unwrap_err().into();
        assert!(e.is_format_error());
    }
}
