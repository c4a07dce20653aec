//! OCF container descriptor parser
//!
//! `META-INF/container.xml` names the package document that everything else
//! hangs off. The parser is fed the file in chunks as it is streamed out of
//! the archive and yields the rootfile path when finished.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use quick_xml::encoding::Decoder;
use quick_xml::events::Event;

use crate::error::EpubError;
use crate::streaming::XmlFeeder;

/// MIME type identifying the EPUB package document rootfile.
const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Streaming parser for `META-INF/container.xml`.
///
/// Feed the file in chunks of any size, then call
/// [`finish`](ContainerParser::finish) to obtain the package document path.
/// The first `<rootfile>` carrying the package media type wins; a container
/// that never declares one falls back to the first rootfile of any type.
pub struct ContainerParser {
    feeder: XmlFeeder,
    state: ContainerState,
    failure: Option<EpubError>,
}

#[derive(Default)]
struct ContainerState {
    in_rootfiles: bool,
    package_path: Option<String>,
    fallback_path: Option<String>,
}

impl ContainerState {
    fn on_event(&mut self, event: &Event<'_>, decoder: Decoder) -> Result<(), EpubError> {
        match event {
            Event::Start(e) | Event::Empty(e) => {
                let name = decoder
                    .decode(e.name().as_ref())
                    .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?
                    .to_string();

                match name.as_str() {
                    "rootfiles" => self.in_rootfiles = true,
                    "rootfile" if self.in_rootfiles => {
                        let mut full_path: Option<String> = None;
                        let mut media_type: Option<String> = None;
                        for attr in e.attributes() {
                            let attr =
                                attr.map_err(|e| EpubError::Parse(format!("Attr error: {:?}", e)))?;
                            let key = decoder
                                .decode(attr.key.as_ref())
                                .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?
                                .to_string();
                            let value = decoder
                                .decode(&attr.value)
                                .map_err(|e| EpubError::Parse(format!("Decode error: {:?}", e)))?
                                .to_string();
                            match key.as_str() {
                                "full-path" => full_path = Some(value),
                                "media-type" => media_type = Some(value),
                                _ => {}
                            }
                        }

                        if let Some(path) = full_path {
                            let is_package =
                                media_type.as_deref() == Some(PACKAGE_MEDIA_TYPE);
                            if is_package && self.package_path.is_none() {
                                self.package_path = Some(path);
                            } else if !is_package && self.fallback_path.is_none() {
                                self.fallback_path = Some(path);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"rootfiles" {
                    self.in_rootfiles = false;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn into_rootfile(self) -> Result<String, EpubError> {
        self.package_path
            .or(self.fallback_path)
            .ok_or_else(|| EpubError::InvalidEpub("No rootfile found in container.xml".into()))
    }
}

impl ContainerParser {
    /// Create a parser expecting container.xml content.
    pub fn new() -> Self {
        Self {
            feeder: XmlFeeder::new(),
            state: ContainerState::default(),
            failure: None,
        }
    }

    /// Feed the next chunk. Chunk boundaries may fall anywhere, including
    /// inside tags and attribute values.
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

    /// Consume the parser and return the package document path.
    pub fn finish(mut self) -> Result<String, EpubError> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        let state = &mut self.state;
        self.feeder
            .finish(|event, decoder| state.on_event(event, decoder))?;
        self.state.into_rootfile()
    }
}

impl Default for ContainerParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl std::io::Write for ContainerParser {
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
