//! Wwise sound banks (`.bnk`) and file packages (`.pck`)
//!
//! Banks are a stream of `tag, size` chunks. `DIDX` indexes media stored in
//! `DATA`. Packages (`AKPK`) hold lookup tables pointing at whole banks and
//! streamed `.wem` files.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};

/// One media blob embedded in a bank or package
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WwiseMedia {
    pub id: u64,
    pub offset: u64,
    pub size: u64,
    /// Display name, `<id>.wem`
    pub name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WwiseBank {
    pub version: u32,
    pub id: u32,
    /// Chunk tags in file order
    pub chunks: Vec<String>,
    pub media: Vec<WwiseMedia>,
}

impl WwiseBank {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut version = 0;
        let mut id = 0;
        let mut chunks = Vec::new();
        let mut index: Vec<(u32, u32, u32)> = Vec::new();
        let mut media_data: Option<(usize, usize)> = None;

        while (cursor.position() as usize) + 8 <= data.len() {
            let mut tag = [0u8; 4];
            cursor.read_exact(&mut tag)?;
            let size = cursor.read_u32::<LittleEndian>()? as usize;
            let start = cursor.position() as usize;
            let end = start
                .checked_add(size)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| Error::decode("bnk", "chunk runs past end of file"))?;

            let chunk = &data[start..end];
            match &tag {
                b"BKHD" => {
                    let mut header = chunk;
                    version = header.read_u32::<LittleEndian>()?;
                    id = header.read_u32::<LittleEndian>()?;
                }
                b"DIDX" => {
                    let mut entries = chunk;
                    while entries.len() >= 12 {
                        index.push((
                            entries.read_u32::<LittleEndian>()?,
                            entries.read_u32::<LittleEndian>()?,
                            entries.read_u32::<LittleEndian>()?,
                        ));
                    }
                }
                b"DATA" => media_data = Some((start, end)),
                _ => {}
            }

            chunks.push(String::from_utf8_lossy(&tag).into_owned());
            cursor.set_position(end as u64);
        }

        if !chunks.iter().any(|c| c == "BKHD") {
            return Err(Error::decode("bnk", "missing BKHD chunk"));
        }

        let mut media = Vec::with_capacity(index.len());
        if let Some((data_start, data_end)) = media_data {
            for (media_id, offset, size) in index {
                let from = data_start + offset as usize;
                let to = from + size as usize;
                if to > data_end {
                    warn!(media = media_id, "Wwise media entry runs past DATA chunk");
                    continue;
                }
                media.push(WwiseMedia {
                    id: media_id as u64,
                    offset: offset as u64,
                    size: size as u64,
                    name: format!("{}.wem", media_id),
                    data: data[from..to].to_vec(),
                });
            }
        }

        Ok(Self {
            version,
            id,
            chunks,
            media,
        })
    }
}

/// A file listed in one of the package lookup tables
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WwisePackageFile {
    pub id: u64,
    pub language_id: u32,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WwisePackage {
    pub version: u32,
    pub languages: Vec<(u32, String)>,
    pub sound_banks: Vec<WwisePackageFile>,
    pub streamed_files: Vec<WwisePackageFile>,
    pub external_files: Vec<WwisePackageFile>,
    /// Every playable blob: streamed and external files plus media embedded
    /// in the packaged banks
    pub media: Vec<WwiseMedia>,
}

impl WwisePackage {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if &magic != b"AKPK" {
            return Err(Error::decode("pck", "missing AKPK magic"));
        }

        let header_size = cursor.read_u32::<LittleEndian>()? as u64;
        let version = cursor.read_u32::<LittleEndian>()?;
        let language_map_size = cursor.read_u32::<LittleEndian>()? as u64;
        let banks_size = cursor.read_u32::<LittleEndian>()? as u64;
        let streams_size = cursor.read_u32::<LittleEndian>()? as u64;
        // Older packages have no external table, so its size field is absent
        let tables_size = language_map_size + banks_size + streams_size;
        let externals_size = if header_size >= 20 + tables_size {
            cursor.read_u32::<LittleEndian>()? as u64
        } else {
            0
        };

        let map_start = cursor.position();
        let languages = read_language_map(data, map_start, language_map_size)?;

        let banks_start = map_start + language_map_size;
        let streams_start = banks_start + banks_size;
        let externals_start = streams_start + streams_size;

        let sound_banks = read_lookup_table(data, banks_start, banks_size, false)?;
        let streamed_files = read_lookup_table(data, streams_start, streams_size, false)?;
        let external_files = read_lookup_table(data, externals_start, externals_size, true)?;

        let mut media = Vec::new();
        for file in streamed_files.iter().chain(external_files.iter()) {
            if let Some(blob) = slice(data, file.offset, file.size) {
                media.push(WwiseMedia {
                    id: file.id,
                    offset: file.offset,
                    size: file.size,
                    name: format!("{}.wem", file.id),
                    data: blob.to_vec(),
                });
            }
        }
        for bank in &sound_banks {
            let Some(blob) = slice(data, bank.offset, bank.size) else {
                continue;
            };
            match WwiseBank::parse(blob) {
                Ok(parsed) => media.extend(parsed.media),
                Err(e) => warn!(bank = bank.id, "Skipping packaged bank: {}", e),
            }
        }

        Ok(Self {
            version,
            languages,
            sound_banks,
            streamed_files,
            external_files,
            media,
        })
    }
}

fn slice(data: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let from = usize::try_from(offset).ok()?;
    let to = from.checked_add(usize::try_from(size).ok()?)?;
    data.get(from..to)
}

fn read_language_map(data: &[u8], start: u64, size: u64) -> Result<Vec<(u32, String)>> {
    let map = slice(data, start, size)
        .ok_or_else(|| Error::decode("pck", "language map out of range"))?;
    if map.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = Cursor::new(map);
    let count = cursor.read_u32::<LittleEndian>()?;
    let mut languages = Vec::new();
    for _ in 0..count {
        let offset = cursor.read_u32::<LittleEndian>()? as usize;
        let id = cursor.read_u32::<LittleEndian>()?;

        // Names are NUL-terminated UTF-16 relative to the map start
        let mut units = Vec::new();
        let mut pos = offset;
        while pos + 2 <= map.len() {
            let unit = u16::from_le_bytes([map[pos], map[pos + 1]]);
            if unit == 0 {
                break;
            }
            units.push(unit);
            pos += 2;
        }
        languages.push((id, String::from_utf16_lossy(&units)));
    }
    Ok(languages)
}

fn read_lookup_table(
    data: &[u8],
    start: u64,
    size: u64,
    wide_ids: bool,
) -> Result<Vec<WwisePackageFile>> {
    let table = slice(data, start, size)
        .ok_or_else(|| Error::decode("pck", "lookup table out of range"))?;
    if table.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = Cursor::new(table);
    let count = cursor.read_u32::<LittleEndian>()?;
    let mut files = Vec::new();
    for _ in 0..count {
        let id = if wide_ids {
            cursor.read_u64::<LittleEndian>()?
        } else {
            cursor.read_u32::<LittleEndian>()? as u64
        };
        let block_size = cursor.read_u32::<LittleEndian>()? as u64;
        let file_size = cursor.read_u32::<LittleEndian>()? as u64;
        let start_block = cursor.read_u32::<LittleEndian>()? as u64;
        let language_id = cursor.read_u32::<LittleEndian>()?;
        files.push(WwisePackageFile {
            id,
            language_id,
            offset: start_block * block_size.max(1),
            size: file_size,
        });
    }
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A bank with a header and two embedded media blobs
    pub(crate) fn sample_bank() -> Vec<u8> {
        let mut bank = Vec::new();
        bank.extend_from_slice(b"BKHD");
        bank.extend_from_slice(&8u32.to_le_bytes());
        bank.extend_from_slice(&134u32.to_le_bytes());
        bank.extend_from_slice(&77u32.to_le_bytes());

        bank.extend_from_slice(b"DIDX");
        bank.extend_from_slice(&24u32.to_le_bytes());
        for (id, offset, size) in [(1001u32, 0u32, 4u32), (1002, 4, 3)] {
            bank.extend_from_slice(&id.to_le_bytes());
            bank.extend_from_slice(&offset.to_le_bytes());
            bank.extend_from_slice(&size.to_le_bytes());
        }

        bank.extend_from_slice(b"DATA");
        bank.extend_from_slice(&7u32.to_le_bytes());
        bank.extend_from_slice(b"RIFFabc");
        bank
    }

    #[test]
    fn test_parse_bank() {
        let bank = WwiseBank::parse(&sample_bank()).unwrap();
        assert_eq!(bank.version, 134);
        assert_eq!(bank.id, 77);
        assert_eq!(bank.chunks, vec!["BKHD", "DIDX", "DATA"]);
        assert_eq!(bank.media.len(), 2);
        assert_eq!(bank.media[0].name, "1001.wem");
        assert_eq!(bank.media[0].data, b"RIFF");
        assert_eq!(bank.media[1].data, b"abc");
    }

    #[test]
    fn test_bank_without_header_is_rejected() {
        assert!(WwiseBank::parse(b"DATA\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn test_parse_package() {
        let bank = sample_bank();
        let stream = b"WEMDATA".to_vec();

        let mut languages = Vec::new();
        languages.extend_from_slice(&1u32.to_le_bytes());
        languages.extend_from_slice(&12u32.to_le_bytes());
        languages.extend_from_slice(&0u32.to_le_bytes());
        for unit in "sfx".encode_utf16().chain([0u16]) {
            languages.extend_from_slice(&unit.to_le_bytes());
        }

        // Offsets are filled in once the header layout is known
        let header_len = 4 + 4 + 20;
        let table_len = 4 + 20;
        let ext_table_len = 4;
        let blobs_start =
            (header_len + languages.len() + table_len * 2 + ext_table_len) as u32;

        let mut banks = Vec::new();
        banks.extend_from_slice(&1u32.to_le_bytes());
        for value in [5u32, 1, bank.len() as u32, blobs_start, 0] {
            banks.extend_from_slice(&value.to_le_bytes());
        }
        let mut streams = Vec::new();
        streams.extend_from_slice(&1u32.to_le_bytes());
        for value in [9u32, 1, stream.len() as u32, blobs_start + bank.len() as u32, 0] {
            streams.extend_from_slice(&value.to_le_bytes());
        }
        let externals = 0u32.to_le_bytes().to_vec();

        let mut data = Vec::new();
        data.extend_from_slice(b"AKPK");
        let header_size = 20 + languages.len() + banks.len() + streams.len() + externals.len();
        data.extend_from_slice(&(header_size as u32).to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&(languages.len() as u32).to_le_bytes());
        data.extend_from_slice(&(banks.len() as u32).to_le_bytes());
        data.extend_from_slice(&(streams.len() as u32).to_le_bytes());
        data.extend_from_slice(&(externals.len() as u32).to_le_bytes());
        data.extend_from_slice(&languages);
        data.extend_from_slice(&banks);
        data.extend_from_slice(&streams);
        data.extend_from_slice(&externals);
        assert_eq!(data.len() as u32, blobs_start);
        data.extend_from_slice(&bank);
        data.extend_from_slice(&stream);

        let package = WwisePackage::parse(&data).unwrap();
        assert_eq!(package.languages, vec![(0, "sfx".to_string())]);
        assert_eq!(package.sound_banks.len(), 1);
        assert_eq!(package.streamed_files.len(), 1);
        assert_eq!(package.media.len(), 3);
        assert_eq!(package.media[0].name, "9.wem");
        assert_eq!(package.media[0].data, b"WEMDATA");
        assert_eq!(package.media[1].name, "1001.wem");
    }
}
