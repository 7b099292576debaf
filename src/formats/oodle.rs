//! Oodle network compression dictionaries (`.udic`)

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{Error, Result};

pub const OODLE_DICTIONARY_MAGIC: u32 = 0x11235801;

/// Location of one compressed blob inside the dictionary file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OodleCompressedData {
    pub offset: u32,
    pub compressed_length: u32,
    pub decompressed_length: u32,
}

impl OodleCompressedData {
    fn read(cursor: &mut Cursor<&[u8]>) -> Result<Self> {
        Ok(Self {
            offset: cursor.read_u32::<LittleEndian>()?,
            compressed_length: cursor.read_u32::<LittleEndian>()?,
            decompressed_length: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OodleDictionaryHeader {
    pub dictionary_version: u8,
    pub oodle_major_header_version: u8,
    pub hash_table_size: i32,
    pub dictionary_data: OodleCompressedData,
    pub compressor_data: OodleCompressedData,
}

impl OodleDictionaryHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != OODLE_DICTIONARY_MAGIC {
            return Err(Error::decode("udic", format!("wrong magic {:#010X}", magic)));
        }

        let header = Self {
            dictionary_version: cursor.read_u8()?,
            oodle_major_header_version: cursor.read_u8()?,
            hash_table_size: cursor.read_i32::<LittleEndian>()?,
            dictionary_data: OodleCompressedData::read(&mut cursor)?,
            compressor_data: OodleCompressedData::read(&mut cursor)?,
        };

        for blob in [header.dictionary_data, header.compressor_data] {
            let end = blob.offset as u64 + blob.compressed_length as u64;
            if end > data.len() as u64 {
                return Err(Error::decode("udic", "data descriptor past end of file"));
            }
        }

        Ok(header)
    }
}
