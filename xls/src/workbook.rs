//! *Workbook* associated structures
use crate::{
    cell::CellValue,
    config::Config,
    records::{
        from_record::{Anomalies, FromRecord},
        Bof, BoundSheet8, CodePage, Date1904, RecordType, SST,
    },
    storage::{SheetProperties, Storage},
    structures::BofType,
    worksheet::{read_sheet, SheetDimensions, SheetInfo, Worksheet},
    ExcelError, RecordStream,
};
use ole2::{Ole, OleEntry};
use std::{
    fs::File,
    io::{self, BufReader, Read, Seek},
    path::Path,
};
use time::{Date, Duration, Month, PrimitiveDateTime, Time};
use tracing::{debug, warn};

/// The date system of a *Workbook*
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateMode {
    /// Serial 1 is 1900-01-01; serial 60 is the non existent 1900-02-29
    #[default]
    Windows1900,
    /// Serial 0 is 1904-01-01
    Mac1904,
}

impl DateMode {
    /// Converts a serial date number into a calendar date and time
    ///
    /// Returns `None` for negative or out of range serials and for the
    /// fictitious 1900-02-29 of the 1900 date system
    pub fn to_datetime(&self, serial: f64) -> Option<PrimitiveDateTime> {
        // 9999-12-31 in the 1900 date system
        const MAX_SERIAL: f64 = 2_958_466.0;
        const SECONDS_PER_DAY: i64 = 86400;
        if !serial.is_finite() || serial < 0.0 || serial >= MAX_SERIAL {
            return None;
        }
        let seconds = (serial * SECONDS_PER_DAY as f64).round() as i64;
        let base = match self {
            DateMode::Mac1904 => Date::from_calendar_date(1904, Month::January, 1),
            DateMode::Windows1900 => match seconds / SECONDS_PER_DAY {
                0..=59 => Date::from_calendar_date(1899, Month::December, 31),
                60 => return None,
                _ => Date::from_calendar_date(1899, Month::December, 30),
            },
        }
        .ok()?;
        PrimitiveDateTime::new(base, Time::MIDNIGHT).checked_add(Duration::seconds(seconds))
    }
}

/// *Workbook*
///
/// The whole content is decoded upfront: a `Workbook` holds no reference to
/// the source file. It is the default [`Storage`]: an empty
/// `Workbook::default()` filled by [`parse_stream()`] is what
/// [`from_stream()`](Self::from_stream) returns
#[derive(Debug, Default)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    shared_strings: Vec<String>,
    date_mode: DateMode,
    codepage: Option<u16>,
    anomalies: Anomalies,
}

/// Looks up the *Workbook* stream, falling back to the *Book* stream written
/// by some older producers
fn workbook_entry<R: Read + Seek>(ole: &Ole<R>) -> Result<&OleEntry, ExcelError> {
    for name in ["Workbook", "Book"] {
        match ole.get_entry_by_name(name) {
            Ok(entry) if !entry.is_storage() => return Ok(entry),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(ExcelError::NotFound("Workbook stream".to_string()))
}

/// Parses a `.xls` file from a reader into `storage`
pub fn parse_reader<R: Read + Seek, S: Storage + ?Sized>(
    reader: R,
    config: &Config,
    storage: &mut S,
) -> Result<(), ExcelError> {
    let ole = Ole::new(reader)?;
    let entry = workbook_entry(&ole)?;
    debug!("Workbook stream \"{}\" ({} bytes)", entry.name, entry.size);
    let data = ole.read_stream(entry)?;
    parse_stream(&data, config, &mut *storage)?;
    for anomaly in ole.anomalies() {
        storage.on_anomaly(None, format!("Ole: {anomaly}"));
    }
    Ok(())
}

/// Parses the records of a *Workbook* stream into `storage`
pub fn parse_stream<S: Storage + ?Sized>(
    data: &[u8],
    config: &Config,
    storage: &mut S,
) -> Result<(), ExcelError> {
    let mut stream = RecordStream::new(data);
    let mut anomalies = Anomalies::new();

    let mut record = stream
        .next()?
        .ok_or("The Workbook stream contains no records")?;
    if record.ty != RecordType::BOF {
        return Err(format!("Expected a BOF record, found {:?}", record.ty).into());
    }
    let bof = Bof::from_record(&mut record, &mut anomalies)?;
    if bof.vers != Bof::BIFF8 {
        return Err(format!(
            "Unsupported BIFF version 0x{:04x} (only BIFF8 is supported)",
            bof.vers
        )
        .into());
    }
    if bof.dt != BofType::Workbook {
        return Err(format!("Unexpected BOF type {:?}", bof.dt).into());
    }

    let mut date_mode = DateMode::Windows1900;
    let mut codepage = None;
    let mut shared_strings: Option<Vec<String>> = None;
    let mut boundsheets = Vec::<BoundSheet8>::new();
    loop {
        let mut record = stream
            .next()?
            .ok_or("Missing EOF record in the workbook globals")?;
        match record.ty {
            RecordType::EOF => break,
            RecordType::FilePass => {
                return Err("The workbook is encrypted".into());
            }
            RecordType::Date1904 => {
                let v = Date1904::from_record(&mut record, &mut anomalies)?;
                if v.f_date1904 != 0 {
                    date_mode = DateMode::Mac1904;
                }
            }
            RecordType::CodePage => {
                codepage = Some(CodePage::from_record(&mut record, &mut anomalies)?.cv);
            }
            RecordType::SST => {
                if shared_strings.is_some() {
                    anomalies.push("Multiple SST records found".to_string());
                }
                let sst = SST::from_record(&mut record, &mut anomalies, config.max_shared_strings)?;
                shared_strings = Some(sst.rgb);
            }
            RecordType::BoundSheet8 => {
                let v = BoundSheet8::from_record(&mut record, &mut anomalies)?;
                if boundsheets.len() >= config.max_sheets {
                    return Err(format!(
                        "The workbook has more than {} sheets",
                        config.max_sheets
                    )
                    .into());
                }
                boundsheets.push(v);
            }
            _ => {}
        }
    }
    if boundsheets.is_empty() {
        return Err("The workbook contains no sheets".into());
    }
    debug!(
        "Globals: {} sheets, {} shared strings, {:?}, codepage {:?}",
        boundsheets.len(),
        shared_strings.as_ref().map_or(0, Vec::len),
        date_mode,
        codepage
    );
    if let Some(codepage) = codepage {
        storage.on_codepage(codepage);
    }
    storage.on_date_mode(date_mode);
    if let Some(strings) = shared_strings.as_deref() {
        storage.on_shared_strings(strings)?;
    }
    for anomaly in anomalies {
        storage.on_anomaly(None, anomaly);
    }

    for (index, boundsheet) in boundsheets.into_iter().enumerate() {
        let info = SheetInfo {
            offset: u64::from(boundsheet.lb_ply_pos),
            properties: SheetProperties {
                name: boundsheet.st_name.to_string(),
                sheet_type: boundsheet.dt,
                visibility: boundsheet.hs_state,
            },
        };
        stream.seek(info.offset).map_err(|e| match e {
            ExcelError::Format(msg) => {
                ExcelError::Format(format!("Sheet \"{}\": {}", info.properties.name, msg))
            }
            e => e,
        })?;
        read_sheet(
            &mut stream,
            index,
            info,
            shared_strings.as_deref(),
            config,
            &mut *storage,
        )?;
    }
    Ok(())
}

impl Workbook {
    /// Parses a `.xls` file from a reader
    ///
    /// The *Workbook* stream is looked up in the root storage, falling back
    /// to the *Book* stream written by some older producers
    pub fn from_reader<R: Read + Seek>(reader: R, config: &Config) -> Result<Self, ExcelError> {
        let mut workbook = Self::default();
        parse_reader(reader, config, &mut workbook)?;
        Ok(workbook)
    }

    /// Opens and parses the `.xls` file at `path`
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, ExcelError> {
        let f = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ExcelError::NotFound(e.to_string()),
            _ => ExcelError::Io(e),
        })?;
        Self::from_reader(BufReader::new(f), &Config::default())
    }

    /// Parses the records of a *Workbook* stream
    pub fn from_stream(data: &[u8], config: &Config) -> Result<Self, ExcelError> {
        let mut workbook = Self::default();
        parse_stream(data, config, &mut workbook)?;
        Ok(workbook)
    }

    fn sheet_mut(&mut self, index: usize) -> Result<&mut Worksheet, ExcelError> {
        self.sheets
            .get_mut(index)
            .ok_or_else(|| format!("Sheet #{index} was never announced").into())
    }

    /// Returns the sheet with the given name
    ///
    /// The lookup is exact first, then case insensitive
    pub fn sheet(&self, name: &str) -> Result<&Worksheet, ExcelError> {
        self.sheets
            .iter()
            .find(|s| s.name() == name)
            .or_else(|| self.sheets.iter().find(|s| s.name().to_lowercase() == name.to_lowercase()))
            .ok_or_else(|| ExcelError::NotFound(format!("Sheet \"{name}\"")))
    }

    /// Returns the sheet at `index` (in workbook order)
    pub fn sheet_by_index(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    /// All the sheets in workbook order
    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    /// The sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name()).collect()
    }

    /// The number of sheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// The shared string table
    pub fn shared_strings(&self) -> &[String] {
        &self.shared_strings
    }

    /// The date system in use
    pub fn date_mode(&self) -> DateMode {
        self.date_mode
    }

    /// The code page declared by the workbook, if any
    pub fn codepage(&self) -> Option<u16> {
        self.codepage
    }

    /// Problems encountered while parsing
    pub fn anomalies(&self) -> &[String] {
        &self.anomalies
    }
}

impl Storage for Workbook {
    fn on_codepage(&mut self, codepage: u16) {
        self.codepage = Some(codepage);
    }

    fn on_date_mode(&mut self, mode: DateMode) {
        self.date_mode = mode;
    }

    fn on_shared_strings(&mut self, strings: &[String]) -> Result<(), ExcelError> {
        self.shared_strings = strings.to_vec();
        Ok(())
    }

    fn on_sheet(&mut self, index: usize, properties: SheetProperties) -> Result<(), ExcelError> {
        if index != self.sheets.len() {
            return Err(format!(
                "Sheet #{index} announced out of order ({} sheets stored)",
                self.sheets.len()
            )
            .into());
        }
        if self
            .sheets
            .iter()
            .any(|s| s.name().eq_ignore_ascii_case(&properties.name))
        {
            warn!("Duplicate sheet name \"{}\"", properties.name);
            self.anomalies
                .push(format!("Duplicate sheet name \"{}\"", properties.name));
        }
        self.sheets.push(Worksheet::new(properties));
        Ok(())
    }

    fn on_dimensions(&mut self, index: usize, dimensions: SheetDimensions) {
        if let Some(sheet) = self.sheets.get_mut(index) {
            sheet.set_dimensions(dimensions);
        }
    }

    fn on_cell(
        &mut self,
        index: usize,
        row: u16,
        column: u16,
        value: CellValue,
    ) -> Result<(), ExcelError> {
        self.sheet_mut(index)?.store(row, column, value);
        Ok(())
    }

    fn on_anomaly(&mut self, index: Option<usize>, anomaly: String) {
        match index.and_then(|i| self.sheets.get_mut(i)) {
            Some(sheet) => sheet.push_anomaly(anomaly),
            None => self.anomalies.push(anomaly),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn datetime(y: i32, m: Month, d: u8, hh: u8, mm: u8, ss: u8) -> PrimitiveDateTime {
        PrimitiveDateTime::new(
            Date::from_calendar_date(y, m, d).unwrap(),
            Time::from_hms(hh, mm, ss).unwrap(),
        )
    }

    #[test]
    fn windows_1900_dates() {
        let mode = DateMode::Windows1900;
        assert_eq!(mode.to_datetime(1.0), Some(datetime(1900, Month::January, 1, 0, 0, 0)));
        assert_eq!(mode.to_datetime(59.0), Some(datetime(1900, Month::February, 28, 0, 0, 0)));
        assert_eq!(mode.to_datetime(60.0), None);
        assert_eq!(mode.to_datetime(61.0), Some(datetime(1900, Month::March, 1, 0, 0, 0)));
        assert_eq!(mode.to_datetime(45000.5), Some(datetime(2023, Month::March, 15, 12, 0, 0)));
        assert_eq!(mode.to_datetime(-1.0), None);
        assert_eq!(mode.to_datetime(f64::NAN), None);
    }

    #[test]
    fn mac_1904_dates() {
        let mode = DateMode::Mac1904;
        assert_eq!(mode.to_datetime(0.0), Some(datetime(1904, Month::January, 1, 0, 0, 0)));
        assert_eq!(mode.to_datetime(1.25), Some(datetime(1904, Month::January, 2, 6, 0, 0)));
        assert_eq!(mode.to_datetime(43538.0), Some(datetime(2023, Month::March, 15, 0, 0, 0)));
    }

    #[test]
    fn empty_stream() {
        assert!(Workbook::from_stream(&[], &Config::default())
            .unwrap_err()
            .is_format_error());
    }
}
