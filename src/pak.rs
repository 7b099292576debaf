//! Pak file format handling
//!
//! Paks are ZIP containers with optional AES encryption and ZSTD compression.
//!
//! ## Format Details
//!
//! - Compression methods: Store (0), Deflate (8), ZStd (100)
//! - Encryption: AES-256-CBC, zero IV, applied after compression
//! - Local header signature for encrypted entries: `PK\x03\x14` (vs `PK\x03\x04` for normal)
//! - ExtraData byte 168 > 0 marks encrypted content
//! - The EOCD comment carries a [`PakHeader`] with the key GUID, a key check
//!   value, the mount point and the project name
//! - Extracted data is checked against the CRC32 in the central directory

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::crypto::{decrypt_aes_cbc, is_zstd_stream, AesKey};
use crate::error::{Error, Result};
use crate::guid::Guid;

/// Standard local file header signature: PK\x03\x04
pub(crate) const LOCAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Encrypted local file header signature: PK\x03\x14
pub(crate) const ENCRYPTED_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x03, 0x14];

/// Central directory header signature: PK\x01\x02
pub(crate) const CENTRAL_HEADER_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];

/// End of central directory signature: PK\x05\x06
pub(crate) const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

/// Magic at the start of the EOCD comment
pub const PAK_HEADER_MAGIC: [u8; 4] = *b"PAKS";

/// Current pak header version
pub const PAK_HEADER_VERSION: u16 = 1;

/// Mount point used when a pak does not declare one
pub const DEFAULT_MOUNT_POINT: &str = "../../../";

/// Compression methods used in pak files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (stored as-is)
    Store,
    /// Standard DEFLATE compression
    Deflate,
    /// ZStandard compression
    Zstd,
    /// Unknown/unsupported method
    Unknown(u16),
}

impl From<u16> for CompressionMethod {
    fn from(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Store,
            8 => CompressionMethod::Deflate,
            100 => CompressionMethod::Zstd,
            other => CompressionMethod::Unknown(other),
        }
    }
}

impl CompressionMethod {
    /// Convert to ZIP compression method number
    pub fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::Store => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Zstd => 100,
            CompressionMethod::Unknown(m) => m,
        }
    }
}

/// Archive-level metadata stored in the EOCD comment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakHeader {
    pub version: u16,
    /// GUID of the key that decrypts this pak; zero for the primary key
    pub encryption_key_guid: Guid,
    pub encrypted: bool,
    /// [`AesKey::check_value`] of the key the pak was encrypted with
    pub key_check: [u8; 16],
    pub mount_point: String,
    pub project_name: String,
}

impl Default for PakHeader {
    fn default() -> Self {
        Self {
            version: PAK_HEADER_VERSION,
            encryption_key_guid: Guid::ZERO,
            encrypted: false,
            key_check: [0u8; 16],
            mount_point: DEFAULT_MOUNT_POINT.to_string(),
            project_name: String::new(),
        }
    }
}

impl PakHeader {
    /// Parse a header from an EOCD comment.
    ///
    /// Comments without the magic describe a plain archive and yield the
    /// default header.
    pub fn parse(comment: &[u8]) -> Result<Self> {
        if comment.len() < 4 || comment[..4] != PAK_HEADER_MAGIC {
            return Ok(Self::default());
        }

        let mut cursor = Cursor::new(&comment[4..]);
        let truncated = |_| Error::InvalidPak("Truncated pak header".to_string());

        let version = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
        let encryption_key_guid = Guid::read_from(&mut cursor).map_err(truncated)?;
        let flags = cursor.read_u8().map_err(truncated)?;
        let mut key_check = [0u8; 16];
        cursor.read_exact(&mut key_check).map_err(truncated)?;
        let mount_point = read_short_string(&mut cursor).map_err(truncated)?;
        let project_name = read_short_string(&mut cursor).map_err(truncated)?;

        Ok(Self {
            version,
            encryption_key_guid,
            encrypted: flags & 0x01 != 0,
            key_check,
            mount_point: if mount_point.is_empty() {
                DEFAULT_MOUNT_POINT.to_string()
            } else {
                mount_point
            },
            project_name,
        })
    }

    /// Serialize into EOCD comment bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64 + self.mount_point.len() + self.project_name.len());
        out.extend_from_slice(&PAK_HEADER_MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.encryption_key_guid.to_le_bytes());
        out.push(u8::from(self.encrypted));
        out.extend_from_slice(&self.key_check);
        for text in [&self.mount_point, &self.project_name] {
            out.extend_from_slice(&(text.len() as u16).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        out
    }
}

fn read_short_string<R: Read>(reader: &mut R) -> std::io::Result<String> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Represents a single entry in a pak archive
#[derive(Debug, Clone)]
pub struct PakEntry {
    /// File name/path within the archive
    pub name: String,
    /// Compressed size in bytes
    pub compressed_size: u64,
    /// Uncompressed size in bytes
    pub uncompressed_size: u64,
    /// Compression method used
    pub compression_method: CompressionMethod,
    /// Whether the entry is encrypted
    pub is_encrypted: bool,
    /// CRC32 checksum
    pub crc32: u32,
    /// Offset to local file header in the archive
    pub(crate) header_offset: u64,
}

/// A pak archive reader
pub struct PakFile {
    path: PathBuf,
    file_size: u64,
    reader: BufReader<File>,
    header: PakHeader,
    entries: HashMap<String, PakEntry>,
    entry_list: Vec<String>,
    key: Option<AesKey>,
}

impl PakFile {
    /// Open a pak file for reading
    ///
    /// Only the central directory and header are read; entry data is read
    /// on demand.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let (entry_list, comment) = read_central_directory(&mut reader)?;
        let header = PakHeader::parse(&comment)?;

        let mut entries = HashMap::with_capacity(entry_list.len());
        let mut names = Vec::with_capacity(entry_list.len());
        for entry in entry_list {
            names.push(entry.name.clone());
            entries.insert(entry.name.clone(), entry);
        }

        debug!(
            pak = %path.display(),
            entries = names.len(),
            encrypted = header.encrypted,
            "Opened pak"
        );

        Ok(PakFile {
            path,
            file_size,
            reader,
            header,
            entries,
            entry_list: names,
            key: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the pak on disk
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn header(&self) -> &PakHeader {
        &self.header
    }

    pub fn is_encrypted(&self) -> bool {
        self.header.encrypted
    }

    pub fn encryption_key_guid(&self) -> Guid {
        self.header.encryption_key_guid
    }

    pub fn mount_point(&self) -> &str {
        &self.header.mount_point
    }

    /// Check a key against the stored key check value.
    ///
    /// Plain paks accept any key.
    pub fn verify_key(&self, key: &AesKey) -> bool {
        !self.header.encrypted || key.check_value() == self.header.key_check
    }

    /// Install the key used for encrypted entries
    pub fn set_key(&mut self, key: AesKey) -> Result<()> {
        if !self.verify_key(&key) {
            return Err(Error::Decryption(format!(
                "Key does not match {}",
                self.name()
            )));
        }
        self.key = Some(key);
        Ok(())
    }

    /// Get an iterator over all entry names, in central directory order
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entry_list.iter().map(|s| s.as_str())
    }

    /// Get all entries
    pub fn entries(&self) -> Vec<&PakEntry> {
        self.entry_list
            .iter()
            .filter_map(|name| self.entries.get(name))
            .collect()
    }

    /// Get the number of entries in the archive
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get a specific entry by name
    pub fn get_entry(&self, name: &str) -> Option<&PakEntry> {
        self.entries.get(name)
    }

    /// Extract a file by name and return its contents
    pub fn extract(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?
            .clone();

        self.extract_entry(&entry)
    }

    /// Extract an entry and return its decrypted, decompressed contents
    pub fn extract_entry(&mut self, entry: &PakEntry) -> Result<Vec<u8>> {
        let data_offset = self.read_local_header_offset(entry)?;
        self.reader.seek(SeekFrom::Start(data_offset))?;

        let mut stored = vec![0u8; entry.compressed_size as usize];
        self.reader.read_exact(&mut stored)?;

        let data = if entry.is_encrypted {
            let key = self.key.as_ref().ok_or_else(|| {
                Error::Decryption(format!("No key submitted for {}", self.name()))
            })?;
            decrypt_aes_cbc(key, &stored)?
        } else {
            stored
        };

        let out = decompress(&data, entry)?;
        if entry.crc32 != 0 && crc32fast::hash(&out) != entry.crc32 {
            return Err(Error::Decompression(format!(
                "CRC mismatch in {}",
                entry.name
            )));
        }
        Ok(out)
    }

    /// Read local file header to get accurate data offset
    ///
    /// Accepts both the standard (PK\x03\x04) and encrypted (PK\x03\x14)
    /// local header signatures.
    pub fn read_local_header_offset(&mut self, entry: &PakEntry) -> Result<u64> {
        self.reader.seek(SeekFrom::Start(entry.header_offset))?;

        let mut sig = [0u8; 4];
        self.reader.read_exact(&mut sig)?;

        if sig != LOCAL_HEADER_SIGNATURE && sig != ENCRYPTED_HEADER_SIGNATURE {
            return Err(Error::InvalidPak(format!(
                "Invalid local file header signature: {:02X?} (expected PK\\x03\\x04 or PK\\x03\\x14)",
                sig
            )));
        }

        // version, flags, compression, time, date, crc, sizes
        self.reader.seek(SeekFrom::Current(22))?;
        let name_len = self.reader.read_u16::<LittleEndian>()?;
        let extra_len = self.reader.read_u16::<LittleEndian>()?;

        Ok(entry.header_offset + 30 + name_len as u64 + extra_len as u64)
    }
}

/// Decompress entry data based on its compression method
fn decompress(data: &[u8], entry: &PakEntry) -> Result<Vec<u8>> {
    let expected = entry.uncompressed_size as usize;

    match entry.compression_method {
        CompressionMethod::Store => {
            if data.len() < expected {
                return Err(Error::Decompression(format!(
                    "Stored entry {} is truncated",
                    entry.name
                )));
            }
            Ok(data[..expected].to_vec())
        }

        CompressionMethod::Deflate => {
            use flate2::read::DeflateDecoder;
            let mut decoder = DeflateDecoder::new(data);
            let mut decompressed = Vec::with_capacity(expected);
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::Decompression(format!("Deflate error: {}", e)))?;
            Ok(decompressed)
        }

        CompressionMethod::Zstd => {
            if !is_zstd_stream(data) {
                return Err(Error::Decompression(format!(
                    "Entry {} is not a ZSTD stream (wrong key?)",
                    entry.name
                )));
            }
            // Encrypted entries carry zero padding after the frame
            let mut decoder = zstd::stream::Decoder::new(data)
                .map_err(|e| Error::Decompression(format!("ZSTD init error: {}", e)))?
                .single_frame();
            let mut decompressed = Vec::with_capacity(expected);
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| Error::Decompression(format!("ZSTD error: {}", e)))?;
            Ok(decompressed)
        }

        CompressionMethod::Unknown(method) => Err(Error::UnsupportedCompression(method)),
    }
}

/// Read the central directory and the EOCD comment
fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<(Vec<PakEntry>, Vec<u8>)> {
    let file_len = reader.seek(SeekFrom::End(0))?;

    // EOCD is 22 bytes plus a comment of at most 65535 bytes
    let search_start = file_len.saturating_sub(65557);

    reader.seek(SeekFrom::Start(search_start))?;
    let mut buffer = vec![0u8; (file_len - search_start) as usize];
    reader.read_exact(&mut buffer)?;

    // The comment may itself contain the signature bytes, so only accept a
    // candidate whose comment length reaches exactly to the end of the file
    let eocd_offset = buffer
        .windows(4)
        .enumerate()
        .rev()
        .filter(|(_, w)| *w == EOCD_SIGNATURE)
        .map(|(i, _)| i)
        .find(|&i| {
            i + 22 <= buffer.len()
                && i + 22 + u16::from_le_bytes([buffer[i + 20], buffer[i + 21]]) as usize
                    == buffer.len()
        })
        .ok_or_else(|| Error::InvalidPak("Cannot find End of Central Directory".to_string()))?;

    let comment = buffer[eocd_offset + 22..].to_vec();
    let eocd_pos = search_start + eocd_offset as u64;

    let (cd_offset, cd_size, total_entries) = if eocd_pos >= 20 {
        reader.seek(SeekFrom::Start(eocd_pos - 20))?;
        let mut locator_sig = [0u8; 4];
        reader.read_exact(&mut locator_sig)?;

        if locator_sig == [0x50, 0x4B, 0x06, 0x07] {
            read_zip64_eocd(reader)?
        } else {
            read_standard_eocd(reader, eocd_pos)?
        }
    } else {
        read_standard_eocd(reader, eocd_pos)?
    };

    let mut entries = Vec::with_capacity(total_entries.min(1 << 20) as usize);
    reader.seek(SeekFrom::Start(cd_offset))?;

    let mut pos = 0u64;
    while pos < cd_size {
        match read_central_directory_entry(reader)? {
            Some(entry) => entries.push(entry),
            None => break,
        }
        pos = reader.stream_position()? - cd_offset;
    }

    Ok((entries, comment))
}

fn read_zip64_eocd<R: Read + Seek>(reader: &mut R) -> Result<(u64, u64, u64)> {
    let _disk_number = reader.read_u32::<LittleEndian>()?;
    let zip64_eocd_offset = reader.read_u64::<LittleEndian>()?;

    reader.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let mut sig = [0u8; 4];
    reader.read_exact(&mut sig)?;

    if sig != [0x50, 0x4B, 0x06, 0x06] {
        return Err(Error::InvalidPak("Invalid ZIP64 EOCD signature".to_string()));
    }

    let _eocd_size = reader.read_u64::<LittleEndian>()?;
    let _version_made = reader.read_u16::<LittleEndian>()?;
    let _version_needed = reader.read_u16::<LittleEndian>()?;
    let _disk_number = reader.read_u32::<LittleEndian>()?;
    let _disk_cd = reader.read_u32::<LittleEndian>()?;
    let _entries_on_disk = reader.read_u64::<LittleEndian>()?;
    let total_entries = reader.read_u64::<LittleEndian>()?;
    let cd_size = reader.read_u64::<LittleEndian>()?;
    let cd_offset = reader.read_u64::<LittleEndian>()?;

    Ok((cd_offset, cd_size, total_entries))
}

fn read_standard_eocd<R: Read + Seek>(reader: &mut R, eocd_pos: u64) -> Result<(u64, u64, u64)> {
    reader.seek(SeekFrom::Start(eocd_pos + 4))?;

    let _disk_number = reader.read_u16::<LittleEndian>()?;
    let _disk_cd = reader.read_u16::<LittleEndian>()?;
    let _entries_on_disk = reader.read_u16::<LittleEndian>()?;
    let total_entries = reader.read_u16::<LittleEndian>()? as u64;
    let cd_size = reader.read_u32::<LittleEndian>()? as u64;
    let cd_offset = reader.read_u32::<LittleEndian>()? as u64;

    Ok((cd_offset, cd_size, total_entries))
}

fn read_central_directory_entry<R: Read + Seek>(reader: &mut R) -> Result<Option<PakEntry>> {
    let mut sig = [0u8; 4];
    if reader.read_exact(&mut sig).is_err() {
        return Ok(None);
    }

    if sig != CENTRAL_HEADER_SIGNATURE {
        return Ok(None);
    }

    let _version_made = reader.read_u16::<LittleEndian>()?;
    let _version_needed = reader.read_u16::<LittleEndian>()?;
    let flags = reader.read_u16::<LittleEndian>()?;
    let compression = reader.read_u16::<LittleEndian>()?;
    let _mod_time = reader.read_u16::<LittleEndian>()?;
    let _mod_date = reader.read_u16::<LittleEndian>()?;
    let crc32 = reader.read_u32::<LittleEndian>()?;
    let mut compressed_size = reader.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = reader.read_u32::<LittleEndian>()? as u64;
    let name_len = reader.read_u16::<LittleEndian>()?;
    let extra_len = reader.read_u16::<LittleEndian>()?;
    let comment_len = reader.read_u16::<LittleEndian>()?;
    let _disk_start = reader.read_u16::<LittleEndian>()?;
    let _internal_attrs = reader.read_u16::<LittleEndian>()?;
    let _external_attrs = reader.read_u32::<LittleEndian>()?;
    let mut header_offset = reader.read_u32::<LittleEndian>()? as u64;

    let mut name_bytes = vec![0u8; name_len as usize];
    reader.read_exact(&mut name_bytes)?;
    let name = String::from_utf8_lossy(&name_bytes).to_string();

    let mut extra = vec![0u8; extra_len as usize];
    reader.read_exact(&mut extra)?;

    // ZIP64 extended information
    let mut extra_cursor = Cursor::new(&extra);
    while extra_cursor.position() + 4 <= extra.len() as u64 {
        let header_id = extra_cursor.read_u16::<LittleEndian>()?;
        let data_size = extra_cursor.read_u16::<LittleEndian>()?;

        if header_id == 0x0001 {
            if uncompressed_size == 0xFFFFFFFF {
                uncompressed_size = extra_cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF {
                compressed_size = extra_cursor.read_u64::<LittleEndian>()?;
            }
            if header_offset == 0xFFFFFFFF {
                header_offset = extra_cursor.read_u64::<LittleEndian>()?;
            }
            break;
        }
        extra_cursor.seek(SeekFrom::Current(data_size as i64))?;
    }

    reader.seek(SeekFrom::Current(comment_len as i64))?;

    // Encrypted when either ZIP encryption flag is set or ExtraData[168] > 0
    let is_encrypted = (flags & 0x0001) != 0
        || (flags & 0x0040) != 0
        || (extra.len() > 168 && extra[168] > 0);

    Ok(Some(PakEntry {
        name,
        compressed_size,
        uncompressed_size,
        compression_method: CompressionMethod::from(compression),
        is_encrypted,
        crc32,
        header_offset,
    }))
}
