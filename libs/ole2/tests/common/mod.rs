//! In-memory builder of small Compound Files
//!
//! Streams are stored flat under the Root Entry. Streams of 4096 bytes or
//! more are laid out first, in insertion order, so the first large stream
//! always starts at sector 0. Smaller streams go to the mini stream.
#![allow(dead_code)]

pub const ENDOFCHAIN: u32 = 0xfffffffe;
pub const FREESECT: u32 = 0xffffffff;
pub const FATSECT: u32 = 0xfffffffd;
pub const NOSTREAM: u32 = 0xffffffff;

pub struct CfbBuilder {
    sector_size: usize,
    streams: Vec<(String, Vec<u8>)>,
    fat_overrides: Vec<(u32, u32)>,
    minifat_overrides: Vec<(u32, u32)>,
    right_overrides: Vec<(u32, u32)>,
}

impl Default for CfbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct DirEntry {
    name: String,
    objtype: u8,
    start: u32,
    size: u64,
}

fn push_chain(sectors: &mut Vec<Vec<u8>>, fat: &mut Vec<u32>, data: &[u8], ss: usize) -> u32 {
    if data.is_empty() {
        return ENDOFCHAIN;
    }
    let start = sectors.len() as u32;
    let count = data.len().div_ceil(ss);
    for (i, chunk) in data.chunks(ss).enumerate() {
        let mut sec = chunk.to_vec();
        sec.resize(ss, 0);
        sectors.push(sec);
        fat.push(if i + 1 == count {
            ENDOFCHAIN
        } else {
            start + i as u32 + 1
        });
    }
    start
}

fn u32s_to_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn dir_entry(e: &DirEntry, left: u32, right: u32, child: u32) -> [u8; 128] {
    let mut buf = [0u8; 128];
    let name: Vec<u16> = e.name.encode_utf16().chain(std::iter::once(0)).collect();
    for (i, c) in name.iter().enumerate() {
        buf[i * 2..i * 2 + 2].copy_from_slice(&c.to_le_bytes());
    }
    buf[64..66].copy_from_slice(&((name.len() * 2) as u16).to_le_bytes());
    buf[66] = e.objtype;
    buf[67] = 1;
    buf[68..72].copy_from_slice(&left.to_le_bytes());
    buf[72..76].copy_from_slice(&right.to_le_bytes());
    buf[76..80].copy_from_slice(&child.to_le_bytes());
    buf[116..120].copy_from_slice(&e.start.to_le_bytes());
    buf[120..128].copy_from_slice(&e.size.to_le_bytes());
    buf
}

impl CfbBuilder {
    pub fn new() -> Self {
        Self {
            sector_size: 512,
            streams: Vec::new(),
            fat_overrides: Vec::new(),
            minifat_overrides: Vec::new(),
            right_overrides: Vec::new(),
        }
    }

    /// Switches to major version 4 (4096 byte sectors)
    pub fn v4(mut self) -> Self {
        self.sector_size = 4096;
        self
    }

    pub fn stream(mut self, name: &str, data: &[u8]) -> Self {
        self.streams.push((name.to_string(), data.to_vec()));
        self
    }

    /// Replaces the FAT value of `sector` once the file is laid out
    pub fn fat_override(mut self, sector: u32, value: u32) -> Self {
        self.fat_overrides.push((sector, value));
        self
    }

    /// Replaces the MiniFAT value of mini `sector` once the file is laid out
    pub fn minifat_override(mut self, sector: u32, value: u32) -> Self {
        self.minifat_overrides.push((sector, value));
        self
    }

    /// Replaces the right sibling of directory entry `id`
    pub fn right_sibling_override(mut self, id: u32, value: u32) -> Self {
        self.right_overrides.push((id, value));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let ss = self.sector_size;
        let mut sectors: Vec<Vec<u8>> = Vec::new();
        let mut fat: Vec<u32> = Vec::new();
        let mut mini_data: Vec<u8> = Vec::new();
        let mut minifat: Vec<u32> = Vec::new();
        let mut entries = vec![DirEntry {
            name: "Root Entry".to_string(),
            objtype: 5,
            start: ENDOFCHAIN,
            size: 0,
        }];

        for (name, data) in self.streams.iter() {
            let start = if data.len() >= 4096 {
                push_chain(&mut sectors, &mut fat, data, ss)
            } else if data.is_empty() {
                ENDOFCHAIN
            } else {
                let start = minifat.len() as u32;
                let count = data.len().div_ceil(64);
                for (i, chunk) in data.chunks(64).enumerate() {
                    mini_data.extend_from_slice(chunk);
                    mini_data.resize(mini_data.len().div_ceil(64) * 64, 0);
                    minifat.push(if i + 1 == count {
                        ENDOFCHAIN
                    } else {
                        start + i as u32 + 1
                    });
                }
                start
            };
            entries.push(DirEntry {
                name: name.clone(),
                objtype: 2,
                start,
                size: data.len() as u64,
            });
        }

        entries[0].start = push_chain(&mut sectors, &mut fat, &mini_data, ss);
        entries[0].size = mini_data.len() as u64;

        for (sector, value) in self.minifat_overrides.iter() {
            minifat[*sector as usize] = *value;
        }
        let per_sector = ss / 4;
        let (first_minifat, minifat_count) = if minifat.is_empty() {
            (ENDOFCHAIN, 0)
        } else {
            let count = minifat.len().div_ceil(per_sector);
            minifat.resize(count * per_sector, FREESECT);
            let first = push_chain(&mut sectors, &mut fat, &u32s_to_bytes(&minifat), ss);
            (first, count as u32)
        };

        // Entries are linked as a right leaning chain in directory order
        let mut sorted: Vec<usize> = (1..entries.len()).collect();
        sorted.sort_by_key(|i| {
            let name = entries[*i].name.to_uppercase();
            (name.encode_utf16().count(), name)
        });
        let mut dir = Vec::new();
        for (id, e) in entries.iter().enumerate() {
            let (right, child) = if id == 0 {
                (NOSTREAM, sorted.first().map_or(NOSTREAM, |v| *v as u32))
            } else {
                let pos = sorted.iter().position(|v| *v == id).unwrap();
                (
                    sorted.get(pos + 1).map_or(NOSTREAM, |v| *v as u32),
                    NOSTREAM,
                )
            };
            let right = self
                .right_overrides
                .iter()
                .find(|(i, _)| *i as usize == id)
                .map_or(right, |(_, v)| *v);
            dir.extend_from_slice(&dir_entry(e, NOSTREAM, right, child));
        }
        dir.resize(dir.len().div_ceil(ss) * ss, 0);
        let dir_count = dir.len() / ss;
        let first_dir = push_chain(&mut sectors, &mut fat, &dir, ss);

        let mut fat_count = 1;
        while sectors.len() + fat_count > fat_count * per_sector {
            fat_count += 1;
        }
        let first_fat = sectors.len() as u32;
        fat.extend(std::iter::repeat(FATSECT).take(fat_count));
        fat.resize(fat_count * per_sector, FREESECT);
        for (sector, value) in self.fat_overrides.iter() {
            fat[*sector as usize] = *value;
        }
        for chunk in u32s_to_bytes(&fat).chunks(ss) {
            sectors.push(chunk.to_vec());
        }

        let mut header = vec![0u8; ss];
        header[0..8].copy_from_slice(&[0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1]);
        header[24..26].copy_from_slice(&0x3eu16.to_le_bytes());
        header[26..28].copy_from_slice(&(if ss == 512 { 3u16 } else { 4u16 }).to_le_bytes());
        header[28..30].copy_from_slice(&0xfffeu16.to_le_bytes());
        header[30..32].copy_from_slice(&(if ss == 512 { 9u16 } else { 12u16 }).to_le_bytes());
        header[32..34].copy_from_slice(&6u16.to_le_bytes());
        if ss == 4096 {
            header[40..44].copy_from_slice(&(dir_count as u32).to_le_bytes());
        }
        header[44..48].copy_from_slice(&(fat_count as u32).to_le_bytes());
        header[48..52].copy_from_slice(&first_dir.to_le_bytes());
        header[56..60].copy_from_slice(&4096u32.to_le_bytes());
        header[60..64].copy_from_slice(&first_minifat.to_le_bytes());
        header[64..68].copy_from_slice(&minifat_count.to_le_bytes());
        header[68..72].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
        for i in 0..109 {
            let v = if i < fat_count {
                first_fat + i as u32
            } else {
                FREESECT
            };
            header[76 + i * 4..80 + i * 4].copy_from_slice(&v.to_le_bytes());
        }

        let mut out = header;
        for sec in sectors {
            out.extend_from_slice(&sec);
        }
        out
    }
}
