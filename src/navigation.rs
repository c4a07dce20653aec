//! Table of contents parsers
//!
//! Supports the EPUB 2 NCX file and, as a fallback, the EPUB 3 XHTML
//! navigation document (`epub:type="toc"`). Both produce the same flat,
//! pre-order list of [`TocEntry`] records; the nesting present in the
//! source document is deliberately discarded, since the reading device
//! presents the TOC as a single scrollable list.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};

use crate::error::EpubError;
use crate::streaming::XmlFeeder;

/// Maximum navPoint nesting honored; deeper points are ignored
const MAX_NAV_DEPTH: usize = 32;

/// Maximum number of TOC entries retained
const MAX_TOC_ENTRIES: usize = 1024;

/// One table of contents entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Display label with whitespace collapsed
    pub label: String,
    /// Target resolved against the content base path, fragment preserved
    pub href: String,
}

/// Collapse runs of whitespace to single spaces and trim the ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn append_entity(label: &mut String, e: &quick_xml::events::BytesRef<'_>) {
    let entity_name = match e.decode() {
        Ok(name) => name.to_string(),
        Err(_) => return,
    };
    let entity = format!("&{};", entity_name);
    match quick_xml::escape::unescape(&entity) {
        Ok(resolved) => label.push_str(&resolved),
        Err(_) => label.push_str(&entity),
    }
}

/// Streaming parser for the NCX navigation file.
///
/// Walks `navMap` / `navPoint` / `navLabel` / `content` and emits one
/// entry per navPoint as soon as its `<content src>` is seen, which in a
/// well-formed NCX puts parents before their children. `pageList`,
/// `navList`, and `docTitle` sections are skipped.
pub struct NcxParser {
    feeder: XmlFeeder,
    state: NcxState,
    failure: Option<EpubError>,
}

struct NavPointFrame {
    label: String,
    emitted: bool,
}

struct NcxState {
    base: String,
    in_nav_map: bool,
    in_label: bool,
    in_text: bool,
    /// navPoints opened beyond `MAX_NAV_DEPTH`, tracked only for balance
    overflow: usize,
    stack: Vec<NavPointFrame>,
    entries: Vec<TocEntry>,
}

impl NcxState {
    fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            in_nav_map: false,
            in_label: false,
            in_text: false,
            overflow: 0,
            stack: Vec::new(),
            entries: Vec::new(),
        }
    }

    fn on_event(&mut self, event: &Event<'_>, decoder: Decoder) -> Result<(), EpubError> {
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let name = decoder
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                match name.as_str() {
                    "navMap" => self.in_nav_map = true,
                    "navPoint" if self.in_nav_map && matches!(event, Event::Start(_)) => {
                        if self.overflow > 0 || self.stack.len() >= MAX_NAV_DEPTH {
                            self.overflow += 1;
                        } else {
                            self.stack.push(NavPointFrame {
                                label: String::new(),
                                emitted: false,
                            });
                        }
                    }
                    "navLabel" if self.overflow == 0 && !self.stack.is_empty() => {
                        self.in_label = true;
                    }
                    "text" if self.in_label => self.in_text = true,
                    "content" if self.overflow == 0 => self.on_content(e, decoder),
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = decoder
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();
                match name.as_str() {
                    "navMap" => self.in_nav_map = false,
                    "navPoint" => {
                        if self.overflow > 0 {
                            self.overflow -= 1;
                        } else {
                            self.stack.pop();
                        }
                    }
                    "navLabel" => self.in_label = false,
                    "text" => self.in_text = false,
                    _ => {}
                }
            }
            Event::Text(e) => {
                if self.in_text {
                    if let Some(point) = self.stack.last_mut() {
                        let text = decoder.decode(e).unwrap_or_default();
                        point.label.push_str(&text);
                    }
                }
            }
            Event::GeneralRef(e) => {
                if self.in_text {
                    if let Some(point) = self.stack.last_mut() {
                        append_entity(&mut point.label, e);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_content(&mut self, e: &BytesStart<'_>, decoder: Decoder) {
        let point = match self.stack.last_mut() {
            Some(point) if !point.emitted => point,
            _ => return,
        };
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() == b"src" {
                let src = decoder.decode(&attr.value).unwrap_or_default().to_string();
                if !src.is_empty() {
                    point.emitted = true;
                    if self.entries.len() < MAX_TOC_ENTRIES {
                        self.entries.push(TocEntry {
                            label: collapse_whitespace(&point.label),
                            href: format!("{}{}", self.base, src),
                        });
                    }
                }
                break;
            }
        }
    }
}

impl NcxParser {
    /// Create a parser resolving content srcs against `base`.
    pub fn new(base: &str) -> Self {
        Self {
            feeder: XmlFeeder::new(),
            state: NcxState::new(base),
            failure: None,
        }
    }

    /// Feed the next chunk of the NCX file.
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

    /// Consume the parser and return the flattened table of contents.
    pub fn finish(mut self) -> Result<Vec<TocEntry>, EpubError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        let state = &mut self.state;
        self.feeder
            .finish(|event, decoder| state.on_event(event, decoder))?;
        Ok(self.state.entries)
    }
}

#[cfg(feature = "std")]
impl std::io::Write for NcxParser {
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

/// Streaming parser for the EPUB 3 XHTML navigation document.
///
/// Extracts anchors from the `<nav epub:type="toc">` section in document
/// order. Used when the package declares no NCX.
pub struct NavParser {
    feeder: XmlFeeder,
    state: NavState,
    failure: Option<EpubError>,
}

struct NavState {
    base: String,
    in_toc_nav: bool,
    in_anchor: bool,
    anchor_href: Option<String>,
    anchor_label: String,
    entries: Vec<TocEntry>,
}

impl NavState {
    fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            in_toc_nav: false,
            in_anchor: false,
            anchor_href: None,
            anchor_label: String::new(),
            entries: Vec::new(),
        }
    }

    fn on_event(&mut self, event: &Event<'_>, decoder: Decoder) -> Result<(), EpubError> {
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let name = decoder
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();

                match name.as_str() {
                    "nav" => {
                        self.in_toc_nav = false;
                        for attr in e.attributes().flatten() {
                            let key = decoder.decode(attr.key.as_ref()).unwrap_or_default();
                            if key == "epub:type" || key.ends_with(":type") {
                                let value = decoder.decode(&attr.value).unwrap_or_default();
                                self.in_toc_nav = value.split_whitespace().any(|t| t == "toc");
                            }
                        }
                    }
                    "a" if self.in_toc_nav => {
                        self.in_anchor = true;
                        self.anchor_label.clear();
                        self.anchor_href = None;
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"href" {
                                let href =
                                    decoder.decode(&attr.value).unwrap_or_default().to_string();
                                if !href.is_empty() {
                                    self.anchor_href = Some(href);
                                }
                            }
                        }
                        if matches!(event, Event::Empty(_)) {
                            self.finish_anchor();
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = decoder
                    .decode(e.name().as_ref())
                    .unwrap_or_default()
                    .to_string();
                match name.as_str() {
                    "nav" => self.in_toc_nav = false,
                    "a" => {
                        if self.in_anchor {
                            self.finish_anchor();
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if self.in_anchor {
                    let text = decoder.decode(e).unwrap_or_default();
                    // Add space separator when concatenating text segments
                    // from formatted anchors (e.g. "Part <em>One</em>")
                    if !self.anchor_label.is_empty()
                        && !self.anchor_label.ends_with(char::is_whitespace)
                        && !text.starts_with(char::is_whitespace)
                    {
                        self.anchor_label.push(' ');
                    }
                    self.anchor_label.push_str(&text);
                }
            }
            Event::GeneralRef(e) => {
                if self.in_anchor {
                    append_entity(&mut self.anchor_label, e);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_anchor(&mut self) {
        self.in_anchor = false;
        if let Some(href) = self.anchor_href.take() {
            if self.entries.len() < MAX_TOC_ENTRIES {
                self.entries.push(TocEntry {
                    label: collapse_whitespace(&self.anchor_label),
                    href: format!("{}{}", self.base, href),
                });
            }
        }
        self.anchor_label.clear();
    }
}

impl NavParser {
    /// Create a parser resolving anchor hrefs against `base`.
    pub fn new(base: &str) -> Self {
        Self {
            feeder: XmlFeeder::new(),
            state: NavState::new(base),
            failure: None,
        }
    }

    /// Feed the next chunk of the navigation document.
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

    /// Consume the parser and return the flattened table of contents.
    pub fn finish(mut self) -> Result<Vec<TocEntry>, EpubError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        let state = &mut self.state;
        self.feeder
            .finish(|event, decoder| state.on_event(event, decoder))?;
        Ok(self.state.entries)
    }
}

#[cfg(feature = "std")]
impl std::io::Write for NavParser {
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
