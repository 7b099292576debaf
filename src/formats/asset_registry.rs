//! Asset registry state (`AssetRegistry*.bin`)
//!
//! Only the version header is decoded; the body layout changes with every
//! engine release.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::guid::Guid;

/// GUID preceding the version number in versioned registries
pub const ASSET_REGISTRY_VERSION_GUID: Guid =
    Guid::new(0x717F9EE7, 0xE9B0493A, 0x88B39132, 0x1B388107);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssetRegistryHeader {
    /// `None` for registries written before the version header existed
    pub version: Option<i32>,
    pub payload_size: u64,
}

impl AssetRegistryHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::decode("asset registry", "file too small"));
        }

        let mut cursor = Cursor::new(data);
        if data.len() >= 20 && Guid::read_from(&mut cursor)? == ASSET_REGISTRY_VERSION_GUID {
            let version = cursor.read_i32::<LittleEndian>()?;
            return Ok(Self {
                version: Some(version),
                payload_size: data.len() as u64 - cursor.position(),
            });
        }

        Ok(Self {
            version: None,
            payload_size: data.len() as u64,
        })
    }
}
