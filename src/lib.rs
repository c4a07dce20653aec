//! ink-epub -- Streaming EPUB book model for e-ink reading devices
//!
//! Parses the structural files of an EPUB (`container.xml`, the package
//! document, the NCX or XHTML navigation document) straight out of the ZIP
//! archive in small chunks and builds the flat model a page-at-a-time
//! reader needs: title, reading order, table of contents and a cumulative
//! chapter size table for whole-book progress.
//!
//! The XML parsers accept input in chunks of any size and never hold a
//! whole document in memory, so books far larger than RAM stay readable.
//! Nothing keeps a file handle open between operations; every archive
//! access reopens the EPUB, which suits devices that power the storage
//! bus down aggressively.
//!
//! # Features
//!
//! - `std` (default) -- enables the streaming ZIP reader, file I/O and the
//!   [`Epub`] book model
//! - `cli` -- builds the `ink-epub` inspection tool

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

extern crate alloc;

pub mod container;
pub mod error;
pub mod navigation;
pub mod opf;
pub mod path;

mod streaming;

#[cfg(feature = "std")]
pub mod archive;

#[cfg(feature = "std")]
pub mod book;

#[cfg(feature = "std")]
pub mod cache;

#[cfg(feature = "std")]
pub mod zip;

// Re-export key types for convenience
#[cfg(feature = "std")]
pub use archive::ArchiveAccessor;
#[cfg(feature = "std")]
pub use book::Epub;
pub use container::ContainerParser;
pub use error::{EpubError, ZipError, ZipErrorKind};
pub use navigation::{NavParser, NcxParser, TocEntry};
pub use opf::{ManifestItem, OpfParser, PackageDocument};
pub use path::{base_dir, normalize_path};
#[cfg(feature = "std")]
pub use zip::{ArchiveLimits, CdEntry, ZipArchive};
