//! Decoders for engine binary formats found inside paks
//!
//! Each decoder turns raw bytes into a serializable structure; the dispatcher
//! renders that structure as indented JSON.
//!
//! - `locres` / `locmeta`: localization tables and their metadata
//! - `bnk` / `pck`: Wwise sound banks and file packages
//! - `ushaderbytecode` / `ushadercode`: shader code archives
//! - `AssetRegistry*.bin`: asset registry state
//! - `udic`: Oodle compression dictionaries

pub mod asset_registry;
pub mod localization;
pub mod oodle;
pub mod shader;
pub mod wwise;

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

pub use asset_registry::AssetRegistryHeader;
pub use localization::{LocMeta, LocRes};
pub use oodle::OodleDictionaryHeader;
pub use shader::ShaderArchive;
pub use wwise::{WwiseBank, WwisePackage};

/// Upper bound for any length prefix read from untrusted data
const MAX_STRING_LEN: i32 = 1 << 20;

/// Read a length-prefixed engine string.
///
/// Positive lengths are single-byte characters, negative lengths are UTF-16
/// code units; both include a trailing NUL.
pub(crate) fn read_fstring<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_i32::<LittleEndian>()?;
    if len == 0 {
        return Ok(String::new());
    }
    if len == i32::MIN || len.abs() > MAX_STRING_LEN {
        return Err(Error::decode("string", format!("invalid length {}", len)));
    }

    let mut text = if len > 0 {
        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes)?;
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        let mut units = vec![0u16; (-len) as usize];
        reader.read_u16_into::<LittleEndian>(&mut units)?;
        String::from_utf16_lossy(&units)
    };

    while text.ends_with('\0') {
        text.pop();
    }
    Ok(text)
}

/// Read an `i32` element count, rejecting negative or absurd values
pub(crate) fn read_count<R: Read>(reader: &mut R, format: &'static str) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()?;
    if !(0..=MAX_STRING_LEN * 16).contains(&count) {
        return Err(Error::decode(format, format!("invalid element count {}", count)));
    }
    Ok(count as usize)
}

#[cfg(test)]
pub(crate) fn write_fstring(out: &mut Vec<u8>, text: &str) {
    if text.is_empty() {
        out.extend_from_slice(&0i32.to_le_bytes());
        return;
    }
    if text.is_ascii() {
        out.extend_from_slice(&(text.len() as i32 + 1).to_le_bytes());
        out.extend_from_slice(text.as_bytes());
        out.push(0);
    } else {
        let units: Vec<u16> = text.encode_utf16().collect();
        out.extend_from_slice(&(-(units.len() as i32 + 1)).to_le_bytes());
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&0u16.to_le_bytes());
    }
}
