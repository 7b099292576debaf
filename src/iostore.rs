//! IoStore table-of-contents (`.utoc`) headers
//!
//! Only the fixed header is read: it identifies the container, its entry
//! count and the GUID of the key that decrypts it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::guid::Guid;

/// Magic at the start of every `.utoc` file
pub const TOC_MAGIC: &[u8; 16] = b"-==--==--==--==-";

/// Container flag: entries are encrypted
pub const TOC_FLAG_ENCRYPTED: u8 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoStoreTocHeader {
    pub version: u8,
    pub header_size: u32,
    pub toc_entry_count: u32,
    pub compressed_block_entry_count: u32,
    pub compression_block_size: u32,
    pub container_id: u64,
    pub encryption_key_guid: Guid,
    pub container_flags: u8,
}

impl IoStoreTocHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 16];
        reader.read_exact(&mut magic)?;
        if &magic != TOC_MAGIC {
            return Err(Error::InvalidPak("Missing IoStore TOC magic".to_string()));
        }

        let version = reader.read_u8()?;
        let _reserved0 = reader.read_u8()?;
        let _reserved1 = reader.read_u16::<LittleEndian>()?;
        let header_size = reader.read_u32::<LittleEndian>()?;
        let toc_entry_count = reader.read_u32::<LittleEndian>()?;
        let compressed_block_entry_count = reader.read_u32::<LittleEndian>()?;
        let _compressed_block_entry_size = reader.read_u32::<LittleEndian>()?;
        let _compression_method_name_count = reader.read_u32::<LittleEndian>()?;
        let _compression_method_name_length = reader.read_u32::<LittleEndian>()?;
        let compression_block_size = reader.read_u32::<LittleEndian>()?;
        let _directory_index_size = reader.read_u32::<LittleEndian>()?;
        let _partition_count = reader.read_u32::<LittleEndian>()?;
        let container_id = reader.read_u64::<LittleEndian>()?;
        let encryption_key_guid = Guid::read_from(reader)?;
        let container_flags = reader.read_u8()?;

        Ok(Self {
            version,
            header_size,
            toc_entry_count,
            compressed_block_entry_count,
            compression_block_size,
            container_id,
            encryption_key_guid,
            container_flags,
        })
    }

    /// Serialized header bytes, padded to `header_size` when it is larger
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.header_size.max(77) as usize);
        out.extend_from_slice(TOC_MAGIC);
        out.push(self.version);
        out.push(0);
        out.extend_from_slice(&0u16.to_le_bytes());
        for value in [
            self.header_size,
            self.toc_entry_count,
            self.compressed_block_entry_count,
            12,
            0,
            0,
            self.compression_block_size,
            0,
            1,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.container_id.to_le_bytes());
        out.extend_from_slice(&self.encryption_key_guid.to_le_bytes());
        out.push(self.container_flags);
        if out.len() < self.header_size as usize {
            out.resize(self.header_size as usize, 0);
        }
        out
    }

    pub fn is_encrypted(&self) -> bool {
        self.container_flags & TOC_FLAG_ENCRYPTED != 0
    }
}

/// A catalogued IoStore container
#[derive(Debug, Clone)]
pub struct IoStoreToc {
    path: PathBuf,
    file_size: u64,
    header: IoStoreTocHeader,
}

impl IoStoreToc {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();
        let header = IoStoreTocHeader::read(&mut BufReader::new(file))?;
        Ok(Self {
            path,
            file_size,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn header(&self) -> &IoStoreTocHeader {
        &self.header
    }

    /// Entries a browser would show: the TOC counts one extra header entry
    pub fn file_count(&self) -> i64 {
        self.header.toc_entry_count as i64 - 1
    }
}
