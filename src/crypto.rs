//! Cryptographic functions for pak decryption and encryption
//!
//! Encrypted pak entries use AES-256-CBC with an all-zero IV and zero padding.
//! Keys travel as text in the form `0x` followed by 64 hex digits.

use std::fmt;
use std::str::FromStr;

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use crate::error::{Error, Result};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Length of a well-formed key string: `0x` plus 64 hex digits
pub const KEY_STRING_LEN: usize = 66;

/// The reserved all-zero key, submitted in place of malformed keys
pub const ZERO_KEY_STRING: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// A 256-bit AES key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AesKey([u8; 32]);

impl AesKey {
    /// The all-zero key
    pub const ZERO: AesKey = AesKey([0u8; 32]);

    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        AesKey(bytes)
    }

    /// Parse a key from hex text, with or without a `0x` prefix
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 64 {
            return Err(Error::InvalidKey(format!(
                "expected 64 hex digits, got {}",
                digits.len()
            )));
        }

        let bytes = hex::decode(digits).map_err(|e| Error::InvalidKey(e.to_string()))?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(AesKey(key))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical `0x`-prefixed uppercase form
    pub fn to_key_string(&self) -> String {
        format!("0x{}", hex::encode_upper(self.0))
    }

    /// Key check value: the encryption of a single zero block.
    ///
    /// Stored in encrypted pak headers so a submitted key can be verified
    /// before any entry is read.
    pub fn check_value(&self) -> [u8; 16] {
        let iv = [0u8; 16];
        let mut block = [0u8; 16];
        let cipher = Aes256CbcEnc::new(&self.0.into(), &iv.into());
        // A single full block never fails NoPadding
        if cipher
            .encrypt_padded_mut::<NoPadding>(&mut block, BLOCK_SIZE)
            .is_err()
        {
            return [0u8; 16];
        }
        block
    }
}

impl FromStr for AesKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AesKey::parse(s)
    }
}

impl fmt::Display for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_key_string())
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material in logs
        write!(f, "AesKey(0x{}..)", hex::encode_upper(&self.0[..2]))
    }
}

/// Decrypt data using AES-256-CBC with a zero IV
///
/// # Arguments
/// * `key` - The archive key
/// * `data` - The encrypted data (must be a multiple of 16 bytes)
///
/// # Returns
/// Decrypted data, still carrying any zero padding. Callers trim to the
/// known payload size.
pub fn decrypt_aes_cbc(key: &AesKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if !data.len().is_multiple_of(BLOCK_SIZE) {
        return Err(Error::Decryption(format!(
            "Data length {} is not a multiple of 16",
            data.len()
        )));
    }

    let iv = [0u8; 16];
    let cipher = Aes256CbcDec::new(&key.0.into(), &iv.into());

    let mut buffer = data.to_vec();
    let decrypted = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| Error::Decryption(format!("AES decryption failed: {:?}", e)))?;

    Ok(decrypted.to_vec())
}

/// Encrypt data using AES-256-CBC with a zero IV
///
/// # Returns
/// Encrypted data zero-padded to a 16-byte boundary
pub fn encrypt_aes_cbc(key: &AesKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let iv = [0u8; 16];
    let cipher = Aes256CbcEnc::new(&key.0.into(), &iv.into());

    let padded_len = data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut buffer = vec![0u8; padded_len];
    buffer[..data.len()].copy_from_slice(data);

    let encrypted = cipher
        .encrypt_padded_mut::<NoPadding>(&mut buffer, padded_len)
        .map_err(|e| Error::Decryption(format!("AES encryption failed: {:?}", e)))?;

    Ok(encrypted.to_vec())
}

/// Check if data is a ZSTD compressed stream
pub fn is_zstd_stream(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    // ZSTD magic number: 0xFD2FB528
    data[0] == 0x28 && data[1] == 0xB5 && data[2] == 0x2F && data[3] == 0xFD
}
