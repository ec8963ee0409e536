//! In-memory builder of small BIFF8 workbooks
#![allow(dead_code)]

#[path = "../../../libs/ole2/tests/common/mod.rs"]
mod cfb;

pub use cfb::CfbBuilder;

pub const BOF: u16 = 0x0809;
pub const EOF: u16 = 0x000a;
pub const CONTINUE: u16 = 0x003c;
pub const BOUNDSHEET8: u16 = 0x0085;
pub const SST: u16 = 0x00fc;
pub const DATE1904: u16 = 0x0022;
pub const CODEPAGE: u16 = 0x0042;
pub const FILEPASS: u16 = 0x002f;
pub const DIMENSIONS: u16 = 0x0200;
pub const NUMBER: u16 = 0x0203;
pub const RK: u16 = 0x027e;
pub const RK_LEGACY: u16 = 0x007e;
pub const MULRK: u16 = 0x00bd;
pub const LABELSST: u16 = 0x00fd;
pub const LABEL: u16 = 0x0204;
pub const BOOLERR: u16 = 0x0205;
pub const BLANK: u16 = 0x0201;
pub const FORMULA: u16 = 0x0006;
pub const STRING: u16 = 0x0207;
pub const WINDOW2: u16 = 0x023e;

pub fn rec(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut v = code.to_le_bytes().to_vec();
    v.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    v.extend_from_slice(payload);
    v
}

/// A record split in several physical records joined by CONTINUE
pub fn rec_continued(code: u16, fragments: &[&[u8]]) -> Vec<u8> {
    let mut v = Vec::new();
    for (i, fragment) in fragments.iter().enumerate() {
        v.extend(rec(if i == 0 { code } else { CONTINUE }, fragment));
    }
    v
}

pub fn bof(version: u16, dt: u16) -> Vec<u8> {
    let mut payload = version.to_le_bytes().to_vec();
    payload.extend_from_slice(&dt.to_le_bytes());
    payload.extend_from_slice(&0x0dbbu16.to_le_bytes());
    payload.extend_from_slice(&0x07ccu16.to_le_bytes());
    payload.extend_from_slice(&[0u8; 8]);
    rec(BOF, &payload)
}

fn cell_header(row: u16, col: u16) -> Vec<u8> {
    let mut v = row.to_le_bytes().to_vec();
    v.extend_from_slice(&col.to_le_bytes());
    v.extend_from_slice(&0x0fu16.to_le_bytes());
    v
}

pub fn number(row: u16, col: u16, value: f64) -> Vec<u8> {
    let mut v = cell_header(row, col);
    v.extend_from_slice(&value.to_le_bytes());
    rec(NUMBER, &v)
}

pub fn rk(row: u16, col: u16, rk: u32) -> Vec<u8> {
    let mut v = cell_header(row, col);
    v.extend_from_slice(&rk.to_le_bytes());
    rec(RK, &v)
}

pub fn mulrk(row: u16, first: u16, values: &[u32]) -> Vec<u8> {
    let mut v = row.to_le_bytes().to_vec();
    v.extend_from_slice(&first.to_le_bytes());
    for rk in values {
        v.extend_from_slice(&0x0fu16.to_le_bytes());
        v.extend_from_slice(&rk.to_le_bytes());
    }
    let last = first + values.len() as u16 - 1;
    v.extend_from_slice(&last.to_le_bytes());
    rec(MULRK, &v)
}

pub fn label_sst(row: u16, col: u16, index: u32) -> Vec<u8> {
    let mut v = cell_header(row, col);
    v.extend_from_slice(&index.to_le_bytes());
    rec(LABELSST, &v)
}

pub fn label(row: u16, col: u16, text: &str) -> Vec<u8> {
    let mut v = cell_header(row, col);
    v.extend(xl_string16(text));
    rec(LABEL, &v)
}

pub fn bool_err(row: u16, col: u16, value: u8, is_error: bool) -> Vec<u8> {
    let mut v = cell_header(row, col);
    v.push(value);
    v.push(u8::from(is_error));
    rec(BOOLERR, &v)
}

pub fn blank(row: u16, col: u16) -> Vec<u8> {
    rec(BLANK, &cell_header(row, col))
}

/// A Formula record with the given 8-byte cached result and a dummy expression
pub fn formula(row: u16, col: u16, result: [u8; 8]) -> Vec<u8> {
    let mut v = cell_header(row, col);
    v.extend_from_slice(&result);
    v.extend_from_slice(&[0u8; 6]);
    // ptgInt 1
    v.extend_from_slice(&3u16.to_le_bytes());
    v.extend_from_slice(&[0x1e, 1, 0]);
    rec(FORMULA, &v)
}

pub fn string(text: &str) -> Vec<u8> {
    rec(STRING, &xl_string16(text))
}

/// XLUnicodeString with compressed characters (latin-1 only)
pub fn xl_string16(text: &str) -> Vec<u8> {
    let mut v = (text.len() as u16).to_le_bytes().to_vec();
    v.push(0);
    v.extend_from_slice(text.as_bytes());
    v
}

/// SST payload header
pub fn sst_header(total: u32, unique: u32) -> Vec<u8> {
    let mut v = total.to_le_bytes().to_vec();
    v.extend_from_slice(&unique.to_le_bytes());
    v
}

/// A single SST record with compressed strings
pub fn sst(strings: &[&str]) -> Vec<u8> {
    let mut v = sst_header(strings.len() as u32, strings.len() as u32);
    for s in strings {
        v.extend(xl_string16(s));
    }
    rec(SST, &v)
}

struct Sheet {
    name: String,
    hs_state: u8,
    dt: u8,
    records: Vec<u8>,
}

/// Builds the *Workbook* stream: globals substream first, then one substream per sheet
pub struct BiffBuilder {
    version: u16,
    globals: Vec<u8>,
    sheets: Vec<Sheet>,
}

impl Default for BiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BiffBuilder {
    pub fn new() -> Self {
        Self {
            version: 0x0600,
            globals: Vec::new(),
            sheets: Vec::new(),
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    /// Appends raw records to the globals substream (before the BoundSheet8 records)
    pub fn global(mut self, records: &[u8]) -> Self {
        self.globals.extend_from_slice(records);
        self
    }

    /// Adds a visible worksheet whose substream holds `records` between BOF and EOF
    pub fn sheet(self, name: &str, records: &[u8]) -> Self {
        self.sheet_with(name, 0, 0, records)
    }

    pub fn sheet_with(mut self, name: &str, hs_state: u8, dt: u8, records: &[u8]) -> Self {
        self.sheets.push(Sheet {
            name: name.to_string(),
            hs_state,
            dt,
            records: records.to_vec(),
        });
        self
    }

    fn boundsheet(offset: u32, sheet: &Sheet) -> Vec<u8> {
        let mut v = offset.to_le_bytes().to_vec();
        v.push(sheet.hs_state);
        v.push(sheet.dt);
        v.push(sheet.name.len() as u8);
        v.push(0);
        v.extend_from_slice(sheet.name.as_bytes());
        rec(BOUNDSHEET8, &v)
    }

    pub fn build_stream(&self) -> Vec<u8> {
        let mut globals = bof(self.version, 0x0005);
        globals.extend_from_slice(&self.globals);
        let boundsheets_len: usize = self
            .sheets
            .iter()
            .map(|s| Self::boundsheet(0, s).len())
            .sum();
        let mut offset = globals.len() + boundsheets_len + rec(EOF, &[]).len();
        let mut substreams = Vec::new();
        for sheet in self.sheets.iter() {
            globals.extend(Self::boundsheet(offset as u32, sheet));
            let dt = if sheet.dt == 2 { 0x0020 } else { 0x0010 };
            let mut substream = bof(self.version, dt);
            substream.extend_from_slice(&sheet.records);
            substream.extend(rec(EOF, &[]));
            offset += substream.len();
            substreams.extend(substream);
        }
        globals.extend(rec(EOF, &[]));
        globals.extend(substreams);
        globals
    }

    /// The whole `.xls` file with the records in a *Workbook* stream
    pub fn build(&self) -> Vec<u8> {
        self.build_named("Workbook")
    }

    pub fn build_named(&self, stream_name: &str) -> Vec<u8> {
        CfbBuilder::new()
            .stream(stream_name, &self.build_stream())
            .build()
    }
}
