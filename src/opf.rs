//! OPF package document parser
//!
//! A single streaming pass over content.opf collects the pieces the book
//! model needs: the title, the manifest id to href mapping, the spine
//! reading order, and the identities of the cover image and navigation
//! documents. Hrefs are resolved against the package base directory as
//! they are read, since everything downstream addresses the archive.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::encoding::Decoder;
use quick_xml::events::Event;

use crate::error::EpubError;
use crate::streaming::XmlFeeder;

/// Maximum number of manifest items retained (fixed-size constraint)
const MAX_MANIFEST_ITEMS: usize = 1024;

/// Maximum number of spine itemrefs retained
const MAX_SPINE_ITEMS: usize = 256;

/// MIME type of the EPUB 2 NCX navigation file
const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// A single item in the package manifest (id -> href mapping)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Resource identifier
    pub id: String,
    /// Path resolved against the package base directory
    pub href: String,
    /// MIME type
    pub media_type: String,
}

/// Everything extracted from content.opf in one pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDocument {
    /// Book title (first non-empty `dc:title`), empty if none declared
    pub title: String,
    /// All resources declared in the manifest, in document order
    pub manifest: Vec<ManifestItem>,
    /// Spine idrefs in reading order, unresolved
    pub spine_idrefs: Vec<String>,
    /// Manifest id of the cover image, if declared
    pub cover_id: Option<String>,
    /// Manifest id of the NCX file, if declared
    pub ncx_id: Option<String>,
    /// Manifest id of the EPUB 3 navigation document, if declared
    pub nav_id: Option<String>,
}

impl PackageDocument {
    /// Get manifest item by id
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Href of the cover image, if the package declares one
    pub fn cover_href(&self) -> Option<&str> {
        self.item_href(self.cover_id.as_deref()?)
    }

    /// Href of the NCX navigation file, if the package declares one
    pub fn ncx_href(&self) -> Option<&str> {
        self.item_href(self.ncx_id.as_deref()?)
    }

    /// Href of the EPUB 3 navigation document, if the package declares one
    pub fn nav_href(&self) -> Option<&str> {
        self.item_href(self.nav_id.as_deref()?)
    }

    fn item_href(&self, id: &str) -> Option<&str> {
        self.item(id).map(|item| item.href.as_str())
    }
}

/// Streaming parser for the OPF package document.
///
/// Constructed with the content base path (the rootfile's directory, empty
/// when the OPF sits at the archive root) so manifest hrefs come out
/// already resolved. Feed chunks of any size, then call
/// [`finish`](OpfParser::finish).
pub struct OpfParser {
    feeder: XmlFeeder,
    state: OpfState,
    failure: Option<EpubError>,
}

struct OpfState {
    base: String,
    in_metadata: bool,
    in_manifest: bool,
    in_spine: bool,
    in_title: bool,
    title_text: String,
    package: PackageDocument,
}

impl OpfState {
    fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            in_metadata: false,
            in_manifest: false,
            in_spine: false,
            in_title: false,
            title_text: String::new(),
            package: PackageDocument::default(),
        }
    }

    fn on_event(&mut self, event: &Event<'_>, decoder: Decoder) -> Result<(), EpubError> {
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let name = decoder
                    .decode(e.name().as_ref())
                    .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?
                    .to_string();

                match name.as_str() {
                    "metadata" => self.in_metadata = true,
                    "manifest" => self.in_manifest = true,
                    "spine" => {
                        self.in_spine = true;
                        for attr in e.attributes() {
                            let attr =
                                attr.map_err(|e| EpubError::Parse(format!("Attr error: {:?}", e)))?;
                            if attr.key.as_ref() == b"toc" {
                                let value = decoder
                                    .decode(&attr.value)
                                    .map_err(|e| {
                                        EpubError::Parse(format!("Decode error: {:?}", e))
                                    })?
                                    .to_string();
                                if self.package.ncx_id.is_none() {
                                    self.package.ncx_id = Some(value);
                                }
                            }
                        }
                    }
                    "title" | "dc:title" if self.in_metadata => {
                        if self.package.title.is_empty() && matches!(event, Event::Start(_)) {
                            self.in_title = true;
                            self.title_text.clear();
                        }
                    }
                    "meta" if self.in_metadata => self.on_meta(e, decoder)?,
                    "item" if self.in_manifest => self.on_manifest_item(e, decoder)?,
                    "itemref" if self.in_spine => self.on_spine_itemref(e, decoder)?,
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"metadata" => self.in_metadata = false,
                b"manifest" => self.in_manifest = false,
                b"spine" => self.in_spine = false,
                b"title" | b"dc:title" => {
                    if self.in_title {
                        self.in_title = false;
                        let title = self.title_text.trim();
                        if !title.is_empty() {
                            self.package.title = title.to_string();
                        }
                    }
                }
                _ => {}
            },
            Event::Text(e) => {
                if self.in_title {
                    let text = decoder
                        .decode(e)
                        .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?;
                    self.title_text.push_str(&text);
                }
            }
            Event::GeneralRef(e) => {
                if self.in_title {
                    let entity_name = e
                        .decode()
                        .map_err(|err| EpubError::Parse(format!("Decode error: {:?}", err)))?;
                    let entity = format!("&{};", entity_name);
                    match quick_xml::escape::unescape(&entity) {
                        Ok(resolved) => self.title_text.push_str(&resolved),
                        Err(_) => self.title_text.push_str(&entity),
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// EPUB 2 cover declaration: `<meta name="cover" content="item-id"/>`
    fn on_meta(
        &mut self,
        e: &quick_xml::events::BytesStart<'_>,
        decoder: Decoder,
    ) -> Result<(), EpubError> {
        let mut is_cover_meta = false;
        let mut content: Option<String> = None;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| EpubError::Parse(format!("Attr error: {:?}", e)))?;
            let value = decoder
                .decode(&attr.value)
                .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?;
            match attr.key.as_ref() {
                b"name" if value == "cover" => is_cover_meta = true,
                b"content" => content = Some(value.to_string()),
                _ => {}
            }
        }

        if is_cover_meta && self.package.cover_id.is_none() {
            self.package.cover_id = content;
        }
        Ok(())
    }

    fn on_manifest_item(
        &mut self,
        e: &quick_xml::events::BytesStart<'_>,
        decoder: Decoder,
    ) -> Result<(), EpubError> {
        if self.package.manifest.len() >= MAX_MANIFEST_ITEMS {
            return Ok(());
        }

        let mut id: Option<String> = None;
        let mut href: Option<String> = None;
        let mut media_type: Option<String> = None;
        let mut properties: Option<String> = None;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| EpubError::Parse(format!("Attr error: {:?}", e)))?;
            let value = decoder
                .decode(&attr.value)
                .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?
                .to_string();
            match attr.key.as_ref() {
                b"id" => id = Some(value),
                b"href" => href = Some(value),
                b"media-type" => media_type = Some(value),
                b"properties" => properties = Some(value),
                _ => {}
            }
        }

        let (id, href) = match (id, href) {
            (Some(id), Some(href)) => (id, href),
            _ => return Ok(()),
        };
        let media_type = media_type.unwrap_or_default();

        if let Some(props) = &properties {
            if props.split_whitespace().any(|p| p == "cover-image") {
                self.package.cover_id = Some(id.clone());
            }
            if props.split_whitespace().any(|p| p == "nav") && self.package.nav_id.is_none() {
                self.package.nav_id = Some(id.clone());
            }
        }
        if media_type == NCX_MEDIA_TYPE && self.package.ncx_id.is_none() {
            self.package.ncx_id = Some(id.clone());
        }

        self.package.manifest.push(ManifestItem {
            id,
            href: format!("{}{}", self.base, href),
            media_type,
        });
        Ok(())
    }

    fn on_spine_itemref(
        &mut self,
        e: &quick_xml::events::BytesStart<'_>,
        decoder: Decoder,
    ) -> Result<(), EpubError> {
        if self.package.spine_idrefs.len() >= MAX_SPINE_ITEMS {
            return Ok(());
        }
        for attr in e.attributes() {
            let attr = attr.map_err(|e| EpubError::Parse(format!("Attr error: {:?}", e)))?;
            if attr.key.as_ref() == b"idref" {
                let value = decoder
                    .decode(&attr.value)
                    .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?
                    .to_string();
                self.package.spine_idrefs.push(value);
                break;
            }
        }
        Ok(())
    }
}

impl OpfParser {
    /// Create a parser resolving hrefs against `base` (the rootfile's
    /// directory with trailing slash, or empty).
    pub fn new(base: &str) -> Self {
        Self {
            feeder: XmlFeeder::new(),
            state: OpfState::new(base),
            failure: None,
        }
    }

    /// Feed the next chunk of the package document.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), EpubError> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        let state = &mut self.state;
        let result = self
            .feeder
            .feed(chunk, |event, decoder| state.on_event(event, decoder));
        if let Err(err) = &result {
            self.failure = Some(err.clone());
        }
        result
    }

    /// Error recorded by an earlier feed, if any.
    pub fn failure(&self) -> Option<&EpubError> {
        self.failure.as_ref()
    }

    /// Consume the parser and return the extracted package data.
    pub fn finish(mut self) -> Result<PackageDocument, EpubError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        let state = &mut self.state;
        self.feeder
            .finish(|event, decoder| state.on_event(event, decoder))?;
        Ok(self.state.package)
    }
}

#[cfg(feature = "std")]
impl std::io::Write for OpfParser {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.feed(buf) {
            Ok(()) => Ok(buf.len()),
            Err(err) => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err.to_string(),
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
