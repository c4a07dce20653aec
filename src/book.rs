//! High-level book model
//!
//! [`Epub`] ties the structural parsers together. One [`Epub::load`] pass
//! reads `container.xml`, the package document and the navigation document
//! out of the archive and leaves behind the title, reading order, table of
//! contents and chapter size table a reader UI navigates with.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::archive::ArchiveAccessor;
use crate::cache;
use crate::container::ContainerParser;
use crate::error::EpubError;
use crate::navigation::{NavParser, NcxParser, TocEntry};
use crate::opf::{OpfParser, PackageDocument};
use crate::path::base_dir;

/// Well-known location of the OCF container descriptor.
const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Chunk size for streaming container.xml, a file of a few hundred bytes.
const CONTAINER_CHUNK_SIZE: usize = 512;

/// Chunk size for streaming the package and navigation documents.
const PACKAGE_CHUNK_SIZE: usize = 1024;

/// One book on disk: archive location, cache location, and the structural
/// model produced by [`Epub::load`].
///
/// Construction is cheap and touches nothing on disk. Until `load()`
/// succeeds the model is empty: no title, no spine, no TOC.
#[derive(Debug)]
pub struct Epub {
    accessor: ArchiveAccessor,
    cache_path: PathBuf,
    title: String,
    cover_href: String,
    spine: Vec<String>,
    toc: Vec<TocEntry>,
    cumulative_sizes: Vec<u64>,
}

/// Staged results of a successful load, committed in one step.
struct LoadedModel {
    title: String,
    cover_href: String,
    spine: Vec<String>,
    toc: Vec<TocEntry>,
    cumulative_sizes: Vec<u64>,
}

impl Epub {
    /// Create a handle for the book at `epub_path`.
    ///
    /// The cache directory is `cache_root/<file stem>`, so repeated opens
    /// of the same file land on the same cache.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(epub_path: P, cache_root: Q) -> Self {
        let epub_path = epub_path.as_ref();
        let stem = epub_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("book"));
        Self {
            accessor: ArchiveAccessor::new(epub_path),
            cache_path: cache_root.as_ref().join(stem),
            title: String::new(),
            cover_href: String::new(),
            spine: Vec::new(),
            toc: Vec::new(),
            cumulative_sizes: Vec::new(),
        }
    }

    /// Parse the book's structural files and populate the model.
    ///
    /// All-or-nothing: on any failure the error is returned and the model
    /// keeps its previous (empty) state.
    pub fn load(&mut self) -> Result<(), EpubError> {
        match self.build_model() {
            Ok(model) => {
                self.title = model.title;
                self.cover_href = model.cover_href;
                self.spine = model.spine;
                self.toc = model.toc;
                self.cumulative_sizes = model.cumulative_sizes;
                log::debug!("[EPUB] Loaded {}", self.accessor.path().display());
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "[EPUB] Failed to load {}: {}",
                    self.accessor.path().display(),
                    err
                );
                Err(err)
            }
        }
    }

    fn build_model(&self) -> Result<LoadedModel, EpubError> {
        log::debug!("[EPUB] Loading {}", self.accessor.path().display());

        self.accessor.entry_size(CONTAINER_PATH)?;
        let opf_path = self.parse_container()?;
        log::debug!("[EPUB] Found package document at {}", opf_path);

        let base = base_dir(&opf_path);
        self.accessor.entry_size(&opf_path)?;
        let package = self.parse_package(&opf_path, base)?;

        let cover_href = package.cover_href().unwrap_or_default().to_string();

        let toc = self.parse_navigation(&package, base)?;
        log::debug!("[EPUB] Parsed {} TOC entries", toc.len());

        let mut spine = Vec::with_capacity(package.spine_idrefs.len());
        for idref in &package.spine_idrefs {
            match package.item(idref) {
                Some(item) => spine.push(item.href.clone()),
                None => {
                    log::warn!("[EPUB] Spine idref '{}' missing from manifest, skipping", idref);
                }
            }
        }

        let mut cumulative_sizes = Vec::with_capacity(spine.len());
        let mut total: u64 = 0;
        for href in &spine {
            match self.accessor.entry_size(href) {
                Ok(size) => total += size,
                Err(err) => {
                    log::warn!("[EPUB] Could not size spine entry '{}': {}", href, err);
                }
            }
            cumulative_sizes.push(total);
        }
        log::debug!("[EPUB] Book size: {}", total);

        Ok(LoadedModel {
            title: package.title,
            cover_href,
            spine,
            toc,
            cumulative_sizes,
        })
    }

    fn parse_container(&self) -> Result<String, EpubError> {
        let mut parser = ContainerParser::new();
        if let Err(err) =
            self.accessor
                .stream_to(CONTAINER_PATH, &mut parser, CONTAINER_CHUNK_SIZE)
        {
            return Err(parser.failure().cloned().unwrap_or(err));
        }
        parser.finish()
    }

    fn parse_package(&self, opf_path: &str, base: &str) -> Result<PackageDocument, EpubError> {
        let mut parser = OpfParser::new(base);
        if let Err(err) = self
            .accessor
            .stream_to(opf_path, &mut parser, PACKAGE_CHUNK_SIZE)
        {
            return Err(parser.failure().cloned().unwrap_or(err));
        }
        parser.finish()
    }

    /// Parse the navigation document into a flat TOC. An NCX reference wins
    /// over an EPUB 3 nav document; a book with neither cannot be navigated.
    fn parse_navigation(
        &self,
        package: &PackageDocument,
        base: &str,
    ) -> Result<Vec<TocEntry>, EpubError> {
        if let Some(href) = package.ncx_href() {
            self.accessor.entry_size(href)?;
            let mut parser = NcxParser::new(base);
            if let Err(err) = self.accessor.stream_to(href, &mut parser, PACKAGE_CHUNK_SIZE) {
                return Err(parser.failure().cloned().unwrap_or(err));
            }
            return parser.finish();
        }

        if let Some(href) = package.nav_href() {
            self.accessor.entry_size(href)?;
            let mut parser = NavParser::new(base);
            if let Err(err) = self.accessor.stream_to(href, &mut parser, PACKAGE_CHUNK_SIZE) {
                return Err(parser.failure().cloned().unwrap_or(err));
            }
            return parser.finish();
        }

        Err(EpubError::InvalidEpub(
            "No NCX or navigation document in manifest".to_string(),
        ))
    }

    /// Book title from the package metadata, empty before `load()` or when
    /// the package declares none.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Archive href of the cover image, empty when the package declares none.
    pub fn cover_href(&self) -> &str {
        &self.cover_href
    }

    /// Path of the EPUB file on disk.
    pub fn path(&self) -> &Path {
        self.accessor.path()
    }

    /// Per-book cache directory path.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Number of resolved spine entries.
    pub fn spine_count(&self) -> usize {
        self.spine.len()
    }

    /// Number of TOC entries.
    pub fn toc_count(&self) -> usize {
        self.toc.len()
    }

    /// Archive href of the spine entry at `spine_index`.
    ///
    /// An out-of-range index falls back to the first entry so a stale
    /// reading position can never take the UI out of the book. Empty
    /// string when the spine is empty.
    pub fn spine_href(&self, spine_index: usize) -> &str {
        if let Some(href) = self.spine.get(spine_index) {
            return href;
        }
        log::warn!("[EPUB] Spine index {} out of range", spine_index);
        self.spine.first().map(String::as_str).unwrap_or_default()
    }

    /// TOC entry at `toc_index`, falling back to the first entry when out
    /// of range. `None` only when the TOC is empty.
    pub fn toc_entry(&self, toc_index: usize) -> Option<&TocEntry> {
        if let Some(entry) = self.toc.get(toc_index) {
            return Some(entry);
        }
        log::warn!("[EPUB] TOC index {} out of range", toc_index);
        self.toc.first()
    }

    /// Spine position of the TOC entry at `toc_index`.
    ///
    /// Hrefs are compared by exact string equality; a TOC href carrying a
    /// fragment never matches a spine href. Unmatched entries map to the
    /// start of the book.
    pub fn spine_index_for_toc_index(&self, toc_index: usize) -> usize {
        let Some(entry) = self.toc_entry(toc_index) else {
            return 0;
        };
        if let Some(index) = self.spine.iter().position(|href| *href == entry.href) {
            return index;
        }
        log::warn!("[EPUB] No spine entry matches TOC href '{}'", entry.href);
        0
    }

    /// TOC position of the spine entry at `spine_index`, `None` when no
    /// TOC href is exactly equal to the spine href.
    pub fn toc_index_for_spine_index(&self, spine_index: usize) -> Option<usize> {
        let href = self.spine.get(spine_index)?;
        self.toc.iter().position(|entry| entry.href == *href)
    }

    /// Total uncompressed size of all spine entries.
    pub fn book_size(&self) -> u64 {
        self.cumulative_sizes.last().copied().unwrap_or(0)
    }

    /// Cumulative spine entry sizes in reading order. Non-decreasing; the
    /// last element equals [`Epub::book_size`].
    pub fn cumulative_sizes(&self) -> &[u64] {
        &self.cumulative_sizes
    }

    /// Whole-book progress in percent for a position `fraction` of the way
    /// through the chapter at `spine_index`.
    ///
    /// Index and fraction are clamped into range. A book with no sized
    /// content has no meaningful progress and yields
    /// [`EpubError::EmptyBook`].
    pub fn progress_percent(&self, spine_index: usize, fraction: f32) -> Result<u8, EpubError> {
        let book_size = self.book_size();
        if book_size == 0 {
            return Err(EpubError::EmptyBook);
        }

        let index = spine_index.min(self.cumulative_sizes.len() - 1);
        let fraction = fraction.clamp(0.0, 1.0);
        let prior = if index >= 1 {
            self.cumulative_sizes[index - 1]
        } else {
            0
        };
        let chapter_size = self.cumulative_sizes[index] - prior;

        let read = prior as f32 + fraction * chapter_size as f32;
        Ok((read / book_size as f32 * 100.0).round() as u8)
    }

    /// Read a resource out of the archive by href, for cover images and
    /// chapter content.
    pub fn read_resource(&self, href: &str) -> Result<Vec<u8>, EpubError> {
        self.accessor.read_entry(href)
    }

    /// Stream a resource out of the archive into `sink` in steps of at
    /// most `chunk_size` bytes. Returns the number of bytes written.
    pub fn stream_resource<W: Write>(
        &self,
        href: &str,
        sink: &mut W,
        chunk_size: usize,
    ) -> Result<u64, EpubError> {
        self.accessor.stream_to(href, sink, chunk_size)
    }

    /// Uncompressed size of a resource in the archive.
    pub fn resource_size(&self, href: &str) -> Result<u64, EpubError> {
        self.accessor.entry_size(href)
    }

    /// Create the cache directory for this book, parents included.
    pub fn setup_cache_dir(&self) -> Result<(), EpubError> {
        cache::ensure_dir(&self.cache_path)
    }

    /// Remove the cache directory for this book and everything in it.
    pub fn clear_cache(&self) -> Result<(), EpubError> {
        cache::clear_dir(&self.cache_path)
    }
}
