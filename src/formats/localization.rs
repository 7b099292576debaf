//! Localization resources (`.locres`) and metadata (`.locmeta`)

use std::collections::BTreeMap;
use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use super::{read_count, read_fstring};
use crate::error::{Error, Result};
use crate::guid::Guid;

/// Magic GUID opening versioned locres files
pub const LOCRES_MAGIC: Guid = Guid::new(0x7574140E, 0xFC034A67, 0x9D90154A, 0x1B7F37C3);

/// Magic GUID opening locmeta files
pub const LOCMETA_MAGIC: Guid = Guid::new(0xA14CEE4F, 0x83554868, 0xBD464C6C, 0x7C50DA70);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LocResVersion {
    Legacy = 0,
    Compact = 1,
    Optimized = 2,
    OptimizedCityHash64 = 3,
}

impl LocResVersion {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::Compact),
            2 => Ok(Self::Optimized),
            3 => Ok(Self::OptimizedCityHash64),
            other => Err(Error::decode("locres", format!("unknown version {}", other))),
        }
    }
}

/// Decoded localization table: namespace → key → localized string
#[derive(Debug, Clone, Serialize)]
pub struct LocRes {
    #[serde(skip)]
    pub version: LocResVersion,
    #[serde(flatten)]
    pub namespaces: BTreeMap<String, BTreeMap<String, String>>,
}

impl LocRes {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let magic = if data.len() >= 16 {
            Guid::read_from(&mut cursor)?
        } else {
            Guid::ZERO
        };

        if magic != LOCRES_MAGIC {
            cursor.seek(SeekFrom::Start(0))?;
            return Self::parse_legacy(&mut cursor);
        }

        let version = LocResVersion::from_u8(cursor.read_u8()?)?;
        let strings_offset = cursor.read_i64::<LittleEndian>()?;
        if strings_offset < 0 || strings_offset as usize >= data.len() {
            return Err(Error::decode("locres", "string array offset out of range"));
        }

        // Localized strings live in one array referenced by index
        let body_start = cursor.position();
        cursor.seek(SeekFrom::Start(strings_offset as u64))?;
        let string_count = read_count(&mut cursor, "locres")?;
        let mut strings = Vec::with_capacity(string_count.min(1 << 16));
        for _ in 0..string_count {
            strings.push(read_fstring(&mut cursor)?);
            if version >= LocResVersion::Optimized {
                let _ref_count = cursor.read_i32::<LittleEndian>()?;
            }
        }
        cursor.seek(SeekFrom::Start(body_start))?;

        if version >= LocResVersion::Optimized {
            let _entries_count = cursor.read_u32::<LittleEndian>()?;
        }

        let namespace_count = cursor.read_u32::<LittleEndian>()?;
        let mut namespaces = BTreeMap::new();
        for _ in 0..namespace_count {
            if version >= LocResVersion::Optimized {
                let _namespace_hash = cursor.read_u32::<LittleEndian>()?;
            }
            let namespace = read_fstring(&mut cursor)?;
            let key_count = cursor.read_u32::<LittleEndian>()?;
            let keys: &mut BTreeMap<String, String> = namespaces.entry(namespace).or_default();

            for _ in 0..key_count {
                if version >= LocResVersion::Optimized {
                    let _key_hash = cursor.read_u32::<LittleEndian>()?;
                }
                let key = read_fstring(&mut cursor)?;
                let _source_hash = cursor.read_u32::<LittleEndian>()?;
                let index = cursor.read_i32::<LittleEndian>()?;
                let text = usize::try_from(index)
                    .ok()
                    .and_then(|i| strings.get(i))
                    .ok_or_else(|| {
                        Error::decode("locres", format!("string index {} out of range", index))
                    })?;
                keys.insert(key, text.clone());
            }
        }

        Ok(Self {
            version,
            namespaces,
        })
    }

    fn parse_legacy(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        let namespace_count = cursor.read_u32::<LittleEndian>()?;
        let mut namespaces = BTreeMap::new();
        for _ in 0..namespace_count {
            let namespace = read_fstring(cursor)?;
            let key_count = cursor.read_u32::<LittleEndian>()?;
            let keys: &mut BTreeMap<String, String> = namespaces.entry(namespace).or_default();
            for _ in 0..key_count {
                let key = read_fstring(cursor)?;
                let _source_hash = cursor.read_u32::<LittleEndian>()?;
                let text = read_fstring(cursor)?;
                keys.insert(key, text);
            }
        }

        Ok(Self {
            version: LocResVersion::Legacy,
            namespaces,
        })
    }

    /// Total number of localized entries
    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Localization target metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocMeta {
    pub version: u8,
    pub native_culture: String,
    pub native_locres: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub compiled_cultures: Vec<String>,
}

impl LocMeta {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let magic = Guid::read_from(&mut cursor)?;
        if magic != LOCMETA_MAGIC {
            return Err(Error::decode("locmeta", "wrong magic"));
        }

        let version = cursor.read_u8()?;
        let native_culture = read_fstring(&mut cursor)?;
        let native_locres = read_fstring(&mut cursor)?;

        let mut compiled_cultures = Vec::new();
        if version >= 1 {
            let count = read_count(&mut cursor, "locmeta")?;
            for _ in 0..count {
                compiled_cultures.push(read_fstring(&mut cursor)?);
            }
        }

        Ok(Self {
            version,
            native_culture,
            native_locres,
            compiled_cultures,
        })
    }
}
