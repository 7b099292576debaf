//! Error types for pakscope

use thiserror::Error;

/// Main error type for pakscope operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid pak file: {0}")]
    InvalidPak(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("Invalid AES key: {0}")]
    InvalidKey(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid GUID: {0}")]
    InvalidGuid(String),

    #[error("Failed to decode {format}: {reason}")]
    Decode { format: &'static str, reason: String },

    #[error("Provider initialization failed: {0}")]
    ProviderInit(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Shorthand for a [`Error::Decode`] failure
    pub fn decode(format: &'static str, reason: impl Into<String>) -> Self {
        Error::Decode {
            format,
            reason: reason.into(),
        }
    }

    /// Whether this error is a cooperative cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for pakscope operations
pub type Result<T> = std::result::Result<T, Error>;
