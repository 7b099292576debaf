//! Pak writer for building archive fixtures in tests
//!
//! The whole archive is assembled in memory and written on [`PakWriter::finish`].
//! Only the plain ZIP layout is produced; no ZIP64 records.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::crypto::{encrypt_aes_cbc, AesKey};
use crate::error::{Error, Result};
use crate::guid::Guid;
use crate::pak::{
    CompressionMethod, PakHeader, CENTRAL_HEADER_SIGNATURE, DEFAULT_MOUNT_POINT,
    ENCRYPTED_HEADER_SIGNATURE, EOCD_SIGNATURE, LOCAL_HEADER_SIGNATURE, PAK_HEADER_VERSION,
};

/// Offset of the encrypted marker inside the extra field
const ENCRYPTED_MARKER: usize = 168;

#[derive(Debug, Clone)]
pub(crate) struct PakWriteOptions {
    pub compression: CompressionMethod,
    /// `None` writes a plain pak
    pub key: Option<AesKey>,
    pub encryption_key_guid: Guid,
    pub mount_point: String,
    pub project_name: String,
}

impl Default for PakWriteOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Zstd,
            key: None,
            encryption_key_guid: Guid::ZERO,
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            project_name: String::new(),
        }
    }
}

pub(crate) struct PakWriteEntry {
    name: String,
    data: Vec<u8>,
    compression: Option<CompressionMethod>,
    encrypt: bool,
}

impl PakWriteEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            compression: None,
            encrypt: true,
        }
    }

    pub fn with_compression(mut self, method: CompressionMethod) -> Self {
        self.compression = Some(method);
        self
    }

    /// Keep this entry in the clear even when the pak has a key
    pub fn with_encryption(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }
}

/// Header fields shared by the local and central records of one entry
struct Record {
    name: String,
    method: u16,
    crc32: u32,
    stored_size: u32,
    size: u32,
    offset: u32,
    encrypted: bool,
}

impl Record {
    fn write_to(&self, out: &mut Vec<u8>, central: bool) -> Result<()> {
        let mut extra = Vec::new();
        if self.encrypted {
            extra.resize(ENCRYPTED_MARKER + 1, 0);
            extra[ENCRYPTED_MARKER] = 1;
        }

        if central {
            out.write_all(&CENTRAL_HEADER_SIGNATURE)?;
            out.write_u16::<LittleEndian>(20)?;
        } else if self.encrypted {
            out.write_all(&ENCRYPTED_HEADER_SIGNATURE)?;
        } else {
            out.write_all(&LOCAL_HEADER_SIGNATURE)?;
        }

        out.write_u16::<LittleEndian>(20)?;
        out.write_u16::<LittleEndian>(u16::from(self.encrypted))?;
        out.write_u16::<LittleEndian>(self.method)?;
        // time and date
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.stored_size)?;
        out.write_u32::<LittleEndian>(self.size)?;
        out.write_u16::<LittleEndian>(self.name.len() as u16)?;
        out.write_u16::<LittleEndian>(extra.len() as u16)?;

        if central {
            // comment length, disk, internal and external attributes
            out.write_u16::<LittleEndian>(0)?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u16::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(0)?;
            out.write_u32::<LittleEndian>(self.offset)?;
        }

        out.write_all(self.name.as_bytes())?;
        out.write_all(&extra)?;
        Ok(())
    }
}

pub(crate) struct PakWriter {
    path: PathBuf,
    options: PakWriteOptions,
    body: Vec<u8>,
    central: Vec<u8>,
    count: usize,
}

impl PakWriter {
    pub fn create_with_options<P: AsRef<Path>>(path: P, options: PakWriteOptions) -> Result<Self> {
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            options,
            body: Vec::new(),
            central: Vec::new(),
            count: 0,
        })
    }

    pub fn add_entry(&mut self, entry: PakWriteEntry) -> Result<()> {
        let method = entry.compression.unwrap_or(self.options.compression);
        let key = self.options.key.filter(|_| entry.encrypt);

        let packed = pack(&entry.data, method)?;
        let stored = match &key {
            Some(key) => encrypt_aes_cbc(key, &packed)?,
            None => packed,
        };

        let record = Record {
            name: entry.name,
            method: method.to_u16(),
            crc32: crc32fast::hash(&entry.data),
            stored_size: stored.len() as u32,
            size: entry.data.len() as u32,
            offset: self.body.len() as u32,
            encrypted: key.is_some(),
        };
        record.write_to(&mut self.body, false)?;
        self.body.extend_from_slice(&stored);
        record.write_to(&mut self.central, true)?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Append the central directory and the EOCD carrying the pak header
    pub fn finish(self) -> Result<()> {
        let header = PakHeader {
            version: PAK_HEADER_VERSION,
            encryption_key_guid: self.options.encryption_key_guid,
            encrypted: self.options.key.is_some(),
            key_check: self
                .options
                .key
                .map(|key| key.check_value())
                .unwrap_or_default(),
            mount_point: self.options.mount_point.clone(),
            project_name: self.options.project_name.clone(),
        };
        let comment = header.to_bytes();

        let mut out = self.body;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.write_all(&EOCD_SIGNATURE)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>(self.count as u16)?;
        out.write_u16::<LittleEndian>(self.count as u16)?;
        out.write_u32::<LittleEndian>(self.central.len() as u32)?;
        out.write_u32::<LittleEndian>(cd_offset)?;
        out.write_u16::<LittleEndian>(comment.len() as u16)?;
        out.write_all(&comment)?;

        fs::write(&self.path, out)?;
        Ok(())
    }
}

fn pack(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::Store => Ok(data.to_vec()),
        CompressionMethod::Deflate => {
            let mut encoder =
                flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data)?;
            Ok(encoder.finish()?)
        }
        CompressionMethod::Zstd => Ok(zstd::encode_all(data, 3)?),
        CompressionMethod::Unknown(m) => Err(Error::UnsupportedCompression(m)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pak::PakFile;

    #[test]
    fn test_header_records_options() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.pak");
        let options = PakWriteOptions {
            mount_point: "../../../Game/".to_string(),
            project_name: "Shooter".to_string(),
            ..Default::default()
        };
        let mut writer = PakWriter::create_with_options(&path, options).unwrap();
        writer.add_entry(PakWriteEntry::new("a.txt", b"a".to_vec())).unwrap();
        assert_eq!(writer.len(), 1);
        writer.finish().unwrap();

        let pak = PakFile::open(&path).unwrap();
        assert_eq!(pak.mount_point(), "../../../Game/");
        assert_eq!(pak.header().project_name, "Shooter");
        assert!(!pak.get_entry("a.txt").unwrap().is_encrypted);
    }

    #[test]
    fn test_per_entry_encryption_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.pak");
        let key = AesKey::from_bytes([3u8; 32]);
        let options = PakWriteOptions {
            key: Some(key),
            ..Default::default()
        };
        let mut writer = PakWriter::create_with_options(&path, options).unwrap();
        writer
            .add_entry(PakWriteEntry::new("plain.txt", b"open".to_vec()).with_encryption(false))
            .unwrap();
        writer
            .add_entry(PakWriteEntry::new("hidden.txt", b"closed".to_vec()))
            .unwrap();
        writer.finish().unwrap();

        let mut pak = PakFile::open(&path).unwrap();
        assert!(!pak.get_entry("plain.txt").unwrap().is_encrypted);
        assert!(pak.get_entry("hidden.txt").unwrap().is_encrypted);
        assert_eq!(pak.extract("plain.txt").unwrap(), b"open");
        pak.set_key(key).unwrap();
        assert_eq!(pak.extract("hidden.txt").unwrap(), b"closed");
    }
}
