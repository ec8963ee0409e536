//! Record conversion traits
use crate::{ExcelError, Record};

/// Stores list of detected problems during parsing
pub type Anomalies = Vec<String>;

/// Decodes a value from the current position of a record payload
pub trait FromRecord {
    /// Reads `Self` advancing the record cursor
    fn from_record(record: &mut Record<'_>, anomalies: &mut Anomalies) -> Result<Self, ExcelError>
    where
        Self: Sized;
}

impl FromRecord for u8 {
    fn from_record(record: &mut Record<'_>, _anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        record.rdu8()
    }
}

impl FromRecord for u16 {
    fn from_record(record: &mut Record<'_>, _anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        record.rdu16()
    }
}

impl FromRecord for u32 {
    fn from_record(record: &mut Record<'_>, _anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        record.rdu32()
    }
}

impl FromRecord for f64 {
    fn from_record(record: &mut Record<'_>, _anomalies: &mut Anomalies) -> Result<Self, ExcelError> {
        record.rdf64()
    }
}
