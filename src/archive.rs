//! Per-call archive access
//!
//! The reading device keeps no file handles open between operations, so
//! [`ArchiveAccessor`] holds only the archive path and its limits. Every
//! call opens the file and parses the central directory fresh, trading
//! repeated open cost for zero steady-state memory.

extern crate alloc;

use alloc::format;
use alloc::vec::Vec;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::EpubError;
use crate::path::normalize_path;
use crate::zip::{ArchiveLimits, CdEntry, ZipArchive, ZipError};

/// Default cap on a single entry's compressed or uncompressed size.
const DEFAULT_MAX_ENTRY_SIZE: usize = 32 * 1024 * 1024;

/// Stateless accessor for entries of an EPUB archive on disk.
#[derive(Clone, Debug)]
pub struct ArchiveAccessor {
    path: PathBuf,
    limits: ArchiveLimits,
}

impl ArchiveAccessor {
    /// Create an accessor for the archive at `path` with default limits.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::with_limits(path, ArchiveLimits::new(DEFAULT_MAX_ENTRY_SIZE))
    }

    /// Create an accessor with explicit limits.
    pub fn with_limits<P: Into<PathBuf>>(path: P, limits: ArchiveLimits) -> Self {
        Self {
            path: path.into(),
            limits,
        }
    }

    /// Path of the underlying archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Uncompressed size of the entry at `href` (normalized before lookup).
    pub fn entry_size(&self, href: &str) -> Result<u64, EpubError> {
        let name = normalize_path(href);
        let zip = self.open()?;
        let entry = self.lookup(&zip, &name)?;
        Ok(u64::from(entry.uncompressed_size))
    }

    /// Stream the inflated entry at `href` into `sink` in steps of at most
    /// `chunk_size` bytes. Returns the number of bytes written. A sink
    /// failure aborts the stream mid-flight.
    pub fn stream_to<W: Write>(
        &self,
        href: &str,
        sink: &mut W,
        chunk_size: usize,
    ) -> Result<u64, EpubError> {
        let name = normalize_path(href);
        let mut zip = self.open()?;
        let entry = self.lookup(&zip, &name)?;
        let written = zip.stream_entry(&entry, sink, chunk_size)?;
        Ok(written as u64)
    }

    /// Read the inflated entry at `href` into a vector.
    pub fn read_entry(&self, href: &str) -> Result<Vec<u8>, EpubError> {
        let name = normalize_path(href);
        let mut zip = self.open()?;
        let entry = self.lookup(&zip, &name)?;
        Ok(zip.read_entry(&entry)?)
    }

    fn open(&self) -> Result<ZipArchive<File>, EpubError> {
        let file = File::open(&self.path).map_err(|e| {
            EpubError::Io(format!("Failed to open {}: {}", self.path.display(), e))
        })?;
        Ok(ZipArchive::new_with_limits(file, Some(self.limits))?)
    }

    fn lookup(&self, zip: &ZipArchive<File>, name: &str) -> Result<CdEntry, EpubError> {
        match zip.get_entry(name) {
            Some(entry) => Ok(entry.clone()),
            None => {
                log::warn!(
                    "[EPUB] Entry '{}' not found in {}",
                    name,
                    self.path.display()
                );
                Err(EpubError::Zip(ZipError::FileNotFound))
            }
        }
    }
}
