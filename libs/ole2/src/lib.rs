//! # A library to read Ole files
//!
//! Provide functionality to read objects in the *Compound File Binary Format*
//!
//! The implementation follows
//! [\[MS-CFB\]](https://docs.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/53989ce4-7b05-4f8d-829b-d08d6148375b)
//! and is geared towards extracting the streams of legacy Office documents.
//! Only structural damage that prevents locating stream data is fatal: every
//! other divergence from \[MS-CFB\] is merely recorded as an anomaly
//!
//! See [Ole] for the main interface documentation and code examples
//!

#![warn(missing_docs)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::io::{self, Read, Seek};
use time::OffsetDateTime;
use tracing::{debug, trace};

const DIFSECT: u32 = 0xfffffffc;
const FATSECT: u32 = 0xfffffffd;
const ENDOFCHAIN: u32 = 0xfffffffe;
const FREESECT: u32 = 0xffffffff;
const MAXREGSECT: u32 = 0xfffffffa;
const MAXREGSID: u32 = 0xfffffffa;
const NOSTREAM: u32 = 0xffffffff;

const SIGNATURE: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];
const HEADER_SIZE: usize = 512;
const DIR_ENTRY_SIZE: usize = 128;
const MINI_SECTOR_SIZE: usize = 64;
const MINI_STREAM_CUTOFF: u64 = 4096;
const INLINE_DIFAT_ENTRIES: usize = 109;

/// The parser for Ole objects
///
/// The whole directory is loaded when the object is created; stream data is
/// only read on request
///
/// # Examples
/// ```no_run
/// use ole2::Ole;
/// use std::fs::File;
/// use std::io::BufReader;
///
/// let f = File::open("MyWorkbook.xls").unwrap();
/// let ole = Ole::new(BufReader::new(f)).unwrap();
/// let entry = ole.get_entry_by_name("Workbook").unwrap();
/// let data = ole.read_stream(entry).unwrap();
/// assert_eq!(data.len() as u64, entry.size);
/// ```
///
/// # Errors
/// Most fuctions return a [`Result<T, std::io::Error>`]
/// * Errors from the IO layer are bubbled
/// * Errors generated in the parser are reported with [`ErrorKind`](std::io::ErrorKind)
///   set to [`InvalidData`](std::io::ErrorKind#variant.InvalidData)
/// * Failed lookups are reported with [`ErrorKind`](std::io::ErrorKind)
///   set to [`NotFound`](std::io::ErrorKind#variant.NotFound)
pub struct Ole<R: Read + Seek> {
    f: RefCell<R>,
    major_version: u16,
    minor_version: u16,
    sector_size: u32,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    entries: Vec<OleEntry>,
    mini_stream: Vec<u8>,
    anomalies: Vec<String>,
}

/// The representation of a *Compound File Directory Entry*
///
/// In principle this can be one of: "Root Entry" (root directory), "Storage Object" (directory)
/// or a "Stream Object" (file)
#[derive(Debug, Clone)]
pub struct OleEntry {
    /// The `id` of the entry (its index in the directory)
    pub id: u32,
    /// The object type of the entry
    ///
    /// For the unallocated type (0) all the remaining fields are meaningless - see
    /// [`is_allocated`](Self::is_allocated)
    pub objtype: u8,
    /// The `name` of the entry
    pub name: String,
    /// The red/black tree value of the entry
    pub color: u8,
    left: u32,
    right: u32,
    child: u32,
    /// The creation time of the entry
    pub ctime: Option<OffsetDateTime>,
    /// The last modification time of the entry
    pub mtime: Option<OffsetDateTime>,
    start_sector: u32,
    /// The size (in bytes) of the entry
    pub size: u64,
    /// A list of non fatal inconguences found in the entry
    pub anomalies: Vec<String>,
}

impl Default for OleEntry {
    fn default() -> Self {
        OleEntry {
            id: 0,
            objtype: 0,
            name: String::new(),
            color: 0,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            ctime: None,
            mtime: None,
            start_sector: ENDOFCHAIN,
            size: 0,
            anomalies: Vec::new(),
        }
    }
}

impl OleEntry {
    /// Returns [true] if the entry is allocated, [false] otherwise
    pub fn is_allocated(&self) -> bool {
        self.objtype > 0
    }

    /// Returns [true] if the entry is a Storage Object or [false] if it's a Stream Object
    pub fn is_storage(&self) -> bool {
        self.objtype == 1 || self.objtype == 5
    }

    fn left(&self) -> Option<u32> {
        if self.is_allocated() && self.left <= MAXREGSID {
            Some(self.left)
        } else {
            None
        }
    }

    fn right(&self) -> Option<u32> {
        if self.is_allocated() && self.right <= MAXREGSID {
            Some(self.right)
        } else {
            None
        }
    }

    fn child(&self) -> Option<u32> {
        if self.is_storage() && self.child <= MAXREGSID {
            Some(self.child)
        } else {
            None
        }
    }

    fn is_mini(&self) -> bool {
        self.id > 0 && self.size < MINI_STREAM_CUTOFF
    }
}

/// Which allocation table a sector chain lives in
#[derive(Debug, Clone, Copy, PartialEq)]
enum Table {
    Fat,
    MiniFat,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Fat => "FAT",
            Table::MiniFat => "MiniFAT",
        }
    }
}

fn invalid_data<E>(error: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, error)
}

fn le_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn le_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn le_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from(le_u32(buf, offset)) | (u64::from(le_u32(buf, offset + 4)) << 32)
}

/// Translates a windows FILETIME to a [datetime](time::OffsetDateTime)
///
/// Returns None if the date is unset or out of range
fn filetime_to_datetime(ftime: u64) -> Option<OffsetDateTime> {
    if ftime == 0 {
        return None;
    }
    let ftime = i128::from(ftime) - 116444736000000000;
    OffsetDateTime::from_unix_timestamp_nanos(ftime * 100).ok()
}

impl<R: Read + Seek> Ole<R> {
    /// Parses an Ole object and collects the relevant characteristics
    pub fn new(reader: R) -> Result<Self, io::Error> {
        let mut ret = Self {
            f: RefCell::new(reader),
            major_version: 0,
            minor_version: 0,
            sector_size: 0,
            fat: Vec::new(),
            minifat: Vec::new(),
            entries: Vec::new(),
            mini_stream: Vec::new(),
            anomalies: Vec::new(),
        };

        let mut header = [0u8; HEADER_SIZE];
        {
            let f = ret.f.get_mut();
            f.seek(io::SeekFrom::Start(0))?;
            f.read_exact(&mut header)?;
        }
        if header[0..8] != SIGNATURE {
            return Err(invalid_data("Not an ole file"));
        }
        if header[8..24] != [0u8; 16] {
            ret.anomalies.push("CLSID is not NULL".to_string());
        }
        ret.minor_version = le_u16(&header, 24);
        ret.major_version = le_u16(&header, 26);
        if ret.minor_version != 0x003e {
            ret.anomalies.push(format!(
                "Minor version set to {:04x} instead of {:04x}",
                ret.minor_version, 0x003e
            ));
        }
        if ret.major_version < 3 || ret.major_version > 4 {
            ret.anomalies.push(format!(
                "Major version set to {} (expected 3 or 4)",
                ret.major_version
            ));
        }
        let byte_order = le_u16(&header, 28);
        if byte_order != 0xfffe {
            ret.anomalies.push(format!(
                "Byte order set to {:04x} instead of {:04x}",
                byte_order, 0xfffe
            ));
        }
        let sector_shift = le_u16(&header, 30);
        ret.sector_size = match sector_shift {
            0x9 => {
                if ret.major_version == 4 {
                    ret.anomalies.push(
                        "Major version 4 should have sector size of 4096 bytes instead of 512"
                            .to_string(),
                    );
                }
                512
            }
            0xc => {
                if ret.major_version == 3 {
                    ret.anomalies.push(
                        "Major version 3 should have sector size of 512 bytes instead of 4096"
                            .to_string(),
                    );
                }
                4096
            }
            _ => {
                return Err(invalid_data(format!(
                    "Invalid sector shift {sector_shift}"
                )));
            }
        };
        let mini_sector_shift = le_u16(&header, 32);
        if mini_sector_shift != 6 {
            ret.anomalies.push(format!(
                "Mini sector shift should be set to 6 but is set to {}",
                mini_sector_shift
            ));
        }
        if header[34..40] != [0u8; 6] {
            ret.anomalies
                .push("Reserved area is not zeroed".to_string());
        }
        let dir_sectors = le_u32(&header, 40);
        if ret.major_version == 3 && dir_sectors != 0 {
            ret.anomalies.push(format!(
                "Number of directory sectors should be 0 for major version 3 but is {}",
                dir_sectors
            ));
        }
        let fat_sectors = le_u32(&header, 44);
        let first_dir_sector = le_u32(&header, 48);
        let cutoff = le_u32(&header, 56);
        if u64::from(cutoff) != MINI_STREAM_CUTOFF {
            ret.anomalies.push(format!(
                "Mini Stream Cutoff Size should be {:x} but is {:x}",
                MINI_STREAM_CUTOFF, cutoff
            ));
        }
        let first_minifat_sector = le_u32(&header, 60);
        let minifat_sectors = le_u32(&header, 64);
        let first_difat_sector = le_u32(&header, 68);
        let difat_sectors = le_u32(&header, 72);
        debug!(
            "Ole v{}.{} sector_size={} fat_sectors={} difat_sectors={} minifat_sectors={}",
            ret.major_version,
            ret.minor_version,
            ret.sector_size,
            fat_sectors,
            difat_sectors,
            minifat_sectors
        );

        let difat = ret.read_difat(&header, first_difat_sector, difat_sectors)?;
        if !usize::try_from(fat_sectors).is_ok_and(|n| n == difat.len()) {
            ret.anomalies.push(format!(
                "Number of FAT sectors in header is {} but {} were found in DIFAT",
                fat_sectors,
                difat.len()
            ));
        }
        ret.read_fat(&difat)?;
        ret.read_directory(first_dir_sector, dir_sectors)?;
        ret.read_minifat(first_minifat_sector, minifat_sectors)?;
        if !ret.minifat.is_empty() {
            let root = &ret.entries[0];
            let (start, size) = (root.start_sector, root.size);
            ret.mini_stream = ret.read_chain(start, size, Table::Fat)?;
        }
        Ok(ret)
    }

    /// Returns the major and minor versions of the Ole structure as a tuple
    pub fn version(&self) -> (u16, u16) {
        (self.major_version, self.minor_version)
    }

    /// Returns the sector size in bytes (either 512 or 4096)
    pub fn sector_size(&self) -> u32 {
        self.sector_size
    }

    /// Returns the number of entries in the Ole directory (allocated or not)
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Lists the anomalies detected in the main Ole structures
    pub fn anomalies(&self) -> &[String] {
        self.anomalies.as_slice()
    }

    /// Retrieves a directory entry by name
    ///
    /// * Path components must be separated with a `/`
    /// * The `Root Entry` is implied and must be omitted
    /// * Names are compared case insensitively
    ///
    /// # Examples
    /// ```no_run
    /// use ole2::Ole;
    /// use std::fs::File;
    /// use std::io::ErrorKind;
    ///
    /// let ole = Ole::new(File::open("MyWorkbook.xls").unwrap()).unwrap();
    /// let macros = match ole.get_entry_by_name("_VBA_PROJECT_CUR/VBA/dir") {
    ///     Ok(v) => v,
    ///     Err(e) => match e.kind() {
    ///         ErrorKind::NotFound => { panic!("The requested entry could not be found") },
    ///         _ => { panic!("An error occurred: {}", e) }
    ///     }
    /// };
    /// ```
    pub fn get_entry_by_name(&self, name: &str) -> Result<&OleEntry, io::Error> {
        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return Ok(&self.entries[0]);
        }
        let mut nextid = self.entries[0].child;
        let mut cur = &self.entries[0];
        let mut steps: usize = 0;
        for part in name.to_uppercase().split('/') {
            let part_len = part.encode_utf16().count();
            loop {
                if nextid > MAXREGSID {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Directory entry {} not found", name),
                    ));
                }
                if steps >= self.entries.len() {
                    return Err(invalid_data(format!(
                        "Search aborted after {} steps: probable loop in the directory tree",
                        steps
                    )));
                }
                steps += 1;
                cur = self.get_entry_by_id(nextid)?;
                let cname = cur.name.to_uppercase();
                let cname_len = cname.encode_utf16().count();
                nextid = if part_len < cname_len {
                    cur.left
                } else if part_len > cname_len {
                    cur.right
                } else if part < cname.as_str() {
                    cur.left
                } else if part > cname.as_str() {
                    cur.right
                } else {
                    break;
                };
            }
            nextid = cur.child;
        }
        Ok(cur)
    }

    /// Retrieves a directory entry by `id`
    pub fn get_entry_by_id(&self, id: u32) -> Result<&OleEntry, io::Error> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.entries.get(id))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "Entry {} is out of range (total entries: {})",
                        id,
                        self.entries.len()
                    ),
                )
            })
    }

    /// Returns an iterator that walks the Ole directory tree
    ///
    /// When looking for specific entries, always prefer
    /// [`get_entry_by_name()`](Self::get_entry_by_name) instead
    ///
    /// See the remarks on [`OleEntryIterator`]
    pub fn ftw(&self) -> OleEntryIterator<'_, R> {
        OleEntryIterator {
            ole: self,
            stack: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Reads the full content of a *Stream Object*
    ///
    /// Streams below the mini stream cutoff are read from the mini stream,
    /// all the others from the regular sectors
    pub fn read_stream(&self, entry: &OleEntry) -> Result<Vec<u8>, io::Error> {
        if entry.is_storage() && entry.id == 0 {
            return Ok(self.mini_stream.clone());
        }
        if entry.size == 0 {
            return Ok(Vec::new());
        }
        let table = if entry.is_mini() {
            Table::MiniFat
        } else {
            Table::Fat
        };
        self.read_chain(entry.start_sector, entry.size, table)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    invalid_data(format!("Stream \"{}\": {}", entry.name, e))
                } else {
                    e
                }
            })
    }

    /// Returns the content of every *Stream Object* paired with its `/` separated path
    pub fn streams(&self) -> Result<Vec<(String, Vec<u8>)>, io::Error> {
        let mut ret = Vec::new();
        for (path, entry) in self.ftw() {
            if entry.is_storage() {
                continue;
            }
            let data = self.read_stream(entry)?;
            ret.push((path, data));
        }
        Ok(ret)
    }

    fn read_difat(
        &mut self,
        header: &[u8],
        first_difat_sector: u32,
        difat_sectors: u32,
    ) -> Result<Vec<u32>, io::Error> {
        let mut difat = Vec::new();
        let inline = &header[76..76 + INLINE_DIFAT_ENTRIES * 4];
        let mut difat_complete = add_difats_from_buf(&mut difat, inline)?;
        if difat_complete {
            if difat_sectors > 0 {
                self.anomalies
                    .push(format!("Found {} spurious DIFAT sector(s)", difat_sectors));
            }
            return Ok(difat);
        }
        let mut difat_sector = first_difat_sector;
        let mut seen = HashSet::new();
        for i in 0..difat_sectors {
            if difat_sector > MAXREGSECT {
                return Err(invalid_data(format!(
                    "Found special sector 0x{:x} in DIFAT chain at position {}",
                    difat_sector, i
                )));
            }
            if !seen.insert(difat_sector) {
                return Err(invalid_data(format!(
                    "Loop detected in DIFAT chain at sector {}",
                    difat_sector
                )));
            }
            let sec = self.read_sector(difat_sector)?;
            let (entries, next) = sec.split_at(sec.len() - 4);
            difat_complete = add_difats_from_buf(&mut difat, entries)?;
            difat_sector = le_u32(next, 0);
            if difat_complete {
                if i != difat_sectors - 1 {
                    self.anomalies.push(format!(
                        "DIFAT completed on sector {} but {} were expected",
                        i + 1,
                        difat_sectors
                    ));
                }
                break;
            }
        }
        if difat_sectors > 0 && difat_sector != ENDOFCHAIN {
            self.anomalies.push(format!(
                "Missing ENDOFCHAIN on last DIFAT sector, found 0x{:x} instead",
                difat_sector
            ));
        }
        Ok(difat)
    }

    fn read_fat(&mut self, difat: &[u32]) -> Result<(), io::Error> {
        for fat_sector in difat {
            let sec = self.read_sector(*fat_sector)?;
            self.fat
                .extend(sec.chunks_exact(4).map(|v| le_u32(v, 0)));
        }
        let mut not_fatsect = false;
        let mut missing_sect = false;
        for fat_sector in difat {
            match self.fat.get(*fat_sector as usize) {
                Some(&FATSECT) => {}
                Some(_) => not_fatsect = true,
                None => missing_sect = true,
            }
        }
        if not_fatsect {
            self.anomalies
                .push("One or more FAT sectors are not marked as FATSECT".to_string());
        }
        if missing_sect {
            self.anomalies
                .push("One or more FAT sectors are missing from FAT".to_string());
        }
        if self.fat.iter().any(|v| *v == DIFSECT) {
            trace!("FAT contains DIFSECT markers");
        }
        Ok(())
    }

    fn read_directory(&mut self, first_dir_sector: u32, dir_sectors: u32) -> Result<(), io::Error> {
        let chain = self
            .chain(first_dir_sector, Table::Fat)
            .map_err(|e| invalid_data(format!("Directory: {e}")))?;
        if self.major_version == 4 && !usize::try_from(dir_sectors).is_ok_and(|n| n == chain.len())
        {
            self.anomalies.push(format!(
                "Directory sector count is {} in the header but {} are walkable",
                dir_sectors,
                chain.len()
            ));
        }
        let mut entries = Vec::new();
        for sector in chain {
            let sec = self.read_sector(sector)?;
            for buf in sec.chunks_exact(DIR_ENTRY_SIZE) {
                let id = u32::try_from(entries.len())
                    .map_err(|_| invalid_data("Ole directory entries overflow"))?;
                entries.push(self.parse_entry(id, buf)?);
            }
        }
        let root = entries
            .first()
            .ok_or_else(|| invalid_data("Empty directory"))?;
        if root.objtype != 5 {
            return Err(invalid_data(format!(
                "Invalid Root Entry: type is {} instead of 5",
                root.objtype
            )));
        }
        if root.name != "Root Entry" {
            self.anomalies
                .push(format!("Root Entry name is \"{}\"", root.name));
        }
        if root.color != 1 {
            self.anomalies
                .push("Root Entry color is not black".to_string());
        }
        debug!("Directory loaded: {} entries", entries.len());
        self.entries = entries;
        Ok(())
    }

    fn parse_entry(&self, id: u32, buf: &[u8]) -> Result<OleEntry, io::Error> {
        let mut ret = OleEntry {
            id,
            objtype: buf[66],
            ..Default::default()
        };
        if ret.objtype == 5 && ret.id != 0 {
            ret.anomalies
                .push("Non Root Entry has a root type".to_string());
        }
        if ![0, 1, 2, 5].contains(&ret.objtype) {
            ret.anomalies
                .push(format!("Invalid object type {}", ret.objtype));
        }
        if ret.objtype == 0 {
            // Unallocated: the entry is garbage
            return Ok(ret);
        }

        let namelen = usize::from(le_u16(buf, 64));
        if namelen < 2 || namelen > 64 || namelen & 1 != 0 {
            return Err(invalid_data(format!(
                "Invalid directory entry {}: name length {} is invalid",
                id, namelen
            )));
        }
        if le_u16(buf, namelen - 2) != 0 {
            return Err(invalid_data(format!(
                "Invalid directory entry {}: name is not null terminated",
                id
            )));
        }
        ret.name = encoding_rs::UTF_16LE
            .decode_without_bom_handling_and_without_replacement(&buf[0..namelen - 2])
            .ok_or_else(|| {
                invalid_data(format!(
                    "Invalid directory entry {}: name is not valid UTF-16",
                    id
                ))
            })?
            .into_owned();
        const ILLEGAL_CHARS: &[char] = &['/', '\\', ':', '!'];
        if ret.name.contains(ILLEGAL_CHARS) {
            return Err(invalid_data(format!(
                "Invalid directory entry {}: name \"{}\" contains invalid characters",
                id, ret.name
            )));
        }
        ret.color = buf[67];
        if ret.color > 1 {
            ret.anomalies
                .push(format!("Invalid entry color {}", ret.color));
        }
        ret.left = le_u32(buf, 68);
        ret.right = le_u32(buf, 72);
        ret.child = le_u32(buf, 76);
        if !ret.is_storage() && ret.child != NOSTREAM {
            ret.anomalies.push("Stream entry with a child".to_string());
        }
        let ctime = le_u64(buf, 100);
        let mtime = le_u64(buf, 108);
        if ret.objtype == 5 && ctime != 0 {
            ret.anomalies
                .push("Root Entry ctime is non zero".to_string());
        }
        ret.ctime = filetime_to_datetime(ctime);
        ret.mtime = filetime_to_datetime(mtime);
        ret.start_sector = le_u32(buf, 116);
        ret.size = le_u64(buf, 120);
        if self.major_version == 3 {
            ret.size &= 0xffffffff;
        }
        if ret.objtype == 1 && ret.size > 0 {
            ret.anomalies.push("Storage object with data".to_string());
        }
        Ok(ret)
    }

    fn read_minifat(&mut self, first: u32, count: u32) -> Result<(), io::Error> {
        if count == 0 || first == ENDOFCHAIN {
            return Ok(());
        }
        let chain = self
            .chain(first, Table::Fat)
            .map_err(|e| invalid_data(format!("MiniFAT: {e}")))?;
        if !usize::try_from(count).is_ok_and(|n| n == chain.len()) {
            self.anomalies.push(format!(
                "MiniFAT sector count is {} in the header but {} are walkable",
                count,
                chain.len()
            ));
        }
        for sector in chain {
            let sec = self.read_sector(sector)?;
            self.minifat
                .extend(sec.chunks_exact(4).map(|v| le_u32(v, 0)));
        }
        Ok(())
    }

    /// Follows a sector chain from `first` until ENDOFCHAIN
    ///
    /// Each sector may be visited only once: a revisited sector means the
    /// chain loops and is reported as `InvalidData`
    fn chain(&self, first: u32, table: Table) -> Result<Vec<u32>, io::Error> {
        let sectors = match table {
            Table::Fat => &self.fat,
            Table::MiniFat => &self.minifat,
        };
        let mut ret = Vec::new();
        let mut seen = HashSet::new();
        let mut cur = first;
        while cur != ENDOFCHAIN {
            if cur > MAXREGSECT {
                return Err(invalid_data(format!(
                    "{} chain starting at {} hits special sector 0x{:x} after {} steps",
                    table.name(),
                    first,
                    cur,
                    ret.len()
                )));
            }
            if !seen.insert(cur) {
                return Err(invalid_data(format!(
                    "Loop in {} sector chain starting at {}: sector {} revisited",
                    table.name(),
                    first,
                    cur
                )));
            }
            ret.push(cur);
            cur = *sectors.get(cur as usize).ok_or_else(|| {
                invalid_data(format!(
                    "{} chain starting at {} is out of {} at sector {}",
                    table.name(),
                    first,
                    table.name(),
                    cur
                ))
            })?;
        }
        Ok(ret)
    }

    fn read_chain(&self, first: u32, size: u64, table: Table) -> Result<Vec<u8>, io::Error> {
        let chain = self.chain(first, table)?;
        let unit = match table {
            Table::Fat => self.sector_size as usize,
            Table::MiniFat => MINI_SECTOR_SIZE,
        };
        let size = usize::try_from(size).map_err(|_| invalid_data("Stream size overflow"))?;
        if chain.len().saturating_mul(unit) < size {
            return Err(invalid_data(format!(
                "{} chain is too short: {} sectors for {} bytes",
                table.name(),
                chain.len(),
                size
            )));
        }
        let needed = size.div_ceil(unit);
        if chain.len() > needed {
            debug!(
                "{} chain starting at {} has {} sectors but only {} are used",
                table.name(),
                first,
                chain.len(),
                needed
            );
        }
        let mut ret = Vec::with_capacity(size);
        for sector in chain.into_iter().take(needed) {
            match table {
                Table::Fat => ret.extend_from_slice(&self.read_sector(sector)?),
                Table::MiniFat => {
                    let start = sector as usize * MINI_SECTOR_SIZE;
                    let data = self
                        .mini_stream
                        .get(start..start + MINI_SECTOR_SIZE)
                        .ok_or_else(|| {
                            invalid_data(format!(
                                "Mini sector {} is beyond the end of the mini stream",
                                sector
                            ))
                        })?;
                    ret.extend_from_slice(data);
                }
            }
        }
        ret.truncate(size);
        Ok(ret)
    }

    fn read_sector(&self, sector_number: u32) -> Result<Vec<u8>, io::Error> {
        if sector_number > MAXREGSECT {
            return Err(invalid_data(format!(
                "Cannot seek to special sector 0x{:x}",
                sector_number
            )));
        }
        let offset = (u64::from(sector_number) + 1) * u64::from(self.sector_size);
        let mut f = self.f.borrow_mut();
        f.seek(io::SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.sector_size as usize];
        f.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                invalid_data(format!("Sector {} is beyond the end of file", sector_number))
            } else {
                e
            }
        })?;
        Ok(buf)
    }
}

fn add_difats_from_buf(difat: &mut Vec<u32>, buf: &[u8]) -> Result<bool, io::Error> {
    for v in buf.chunks_exact(4).map(|v| le_u32(v, 0)) {
        match v {
            DIFSECT | FATSECT | ENDOFCHAIN => {
                return Err(invalid_data(format!(
                    "Found DIFAT sector with special offset 0x{:x}",
                    v
                )));
            }
            FREESECT => return Ok(true),
            _ => difat.push(v),
        }
    }
    Ok(false)
}

/// An iterator that walks the Ole directory tree
///
/// # Warning
/// Due to the Ole structure, it is possible to chain entries in convoluted ways
///
/// The iterator is safe from inifinte loops but may not reach all the entries
/// from all the possible paths
pub struct OleEntryIterator<'a, R: Read + Seek> {
    ole: &'a Ole<R>,
    stack: Vec<(String, u32)>,
    seen: HashSet<u32>,
}

impl<'a, R: Read + Seek> Iterator for OleEntryIterator<'a, R> {
    /// A tuple consisting of:
    /// * A `/` separated path
    /// * An Ole directory Entry
    type Item = (String, &'a OleEntry);

    fn next(&mut self) -> Option<Self::Item> {
        if self.seen.is_empty() {
            self.seen.insert(0);
            if let Some(first_child) = self.ole.entries[0].child() {
                self.seen.insert(first_child);
                self.stack.push((String::new(), first_child));
            }
        }
        while let Some((path, next_id)) = self.stack.pop() {
            let Ok(cur) = self.ole.get_entry_by_id(next_id) else {
                continue;
            };
            if !cur.is_allocated() {
                continue;
            }
            let child_path = format!("{}{}/", path, cur.name);
            if let Some(id) = cur.child() {
                if self.seen.insert(id) {
                    self.stack.push((child_path, id));
                }
            }
            for id in [cur.right(), cur.left()].into_iter().flatten() {
                if self.seen.insert(id) {
                    self.stack.push((path.clone(), id));
                }
            }
            return Some((format!("{}{}", path, cur.name), cur));
        }
        None
    }
}
