//! Unified error types for ink-epub
//!
//! Provides a top-level `EpubError` that wraps module-specific errors,
//! plus `From` impls so `?` works across module boundaries.

extern crate alloc;

use alloc::string::String;
use core::fmt;

/// Top-level error type for ink-epub operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EpubError {
    /// ZIP archive error
    Zip(ZipError),
    /// XML parsing error (container.xml, OPF, or navigation document)
    Parse(String),
    /// Invalid EPUB structure (missing required files, broken references, etc.)
    InvalidEpub(String),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Progress requested on a book with no spine content or zero total size
    EmptyBook,
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpubError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            EpubError::Parse(msg) => write!(f, "Parse error: {}", msg),
            EpubError::InvalidEpub(msg) => write!(f, "Invalid EPUB: {}", msg),
            EpubError::Io(msg) => write!(f, "I/O error: {}", msg),
            EpubError::EmptyBook => write!(f, "Book has no content to measure progress against"),
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// I/O error during ZIP operations
    IoError,
    /// Central directory full (exceeded max entries)
    CentralDirFull,
    /// Stream chunk size or scratch buffer is empty
    BufferTooSmall,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::IoError => write!(f, "I/O error"),
            ZipErrorKind::CentralDirFull => write!(f, "central directory full"),
            ZipErrorKind::BufferTooSmall => write!(f, "buffer too small"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EpubError {}

#[cfg(feature = "std")]
impl std::error::Error for ZipErrorKind {}

impl From<ZipErrorKind> for EpubError {
    fn from(kind: ZipErrorKind) -> Self {
        EpubError::Zip(kind)
    }
}
