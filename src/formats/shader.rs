//! Shader code archives (`.ushaderbytecode`, `.ushadercode`)

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use super::read_count;
use crate::error::Result;

/// Size of a SHA-1 hash
const SHA_HASH_LEN: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ShaderArchive {
    pub version: u32,
    pub shader_map_hashes: Vec<String>,
    pub shader_hashes: Vec<String>,
    /// Bytes following the hash tables (entries and code)
    pub remaining_size: u64,
}

impl ShaderArchive {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let version = cursor.read_u32::<LittleEndian>()?;
        let shader_map_hashes = read_hashes(&mut cursor)?;
        let shader_hashes = read_hashes(&mut cursor)?;
        let remaining_size = data.len() as u64 - cursor.position();

        Ok(Self {
            version,
            shader_map_hashes,
            shader_hashes,
            remaining_size,
        })
    }
}

fn read_hashes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<String>> {
    let count = read_count(cursor, "shader archive")?;
    let mut hashes = Vec::with_capacity(count.min(1 << 16));
    let mut hash = [0u8; SHA_HASH_LEN];
    for _ in 0..count {
        cursor.read_exact(&mut hash)?;
        hashes.push(hex::encode_upper(hash));
    }
    Ok(hashes)
}
