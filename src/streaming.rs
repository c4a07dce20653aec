//! Incremental XML event pump shared by the metadata parsers
//!
//! EPUB metadata files are streamed out of the archive in small chunks, so
//! the XML inside them can be cut anywhere: mid-tag, mid-attribute, even in
//! the middle of an entity reference. [`XmlFeeder`] buffers the unconsumed
//! tail of each chunk and re-runs quick-xml over it once more bytes arrive,
//! emitting every event exactly once regardless of where the cuts fall.

extern crate alloc;

use alloc::format;
use alloc::vec::Vec;
use quick_xml::encoding::Decoder;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::EpubError;

/// Maximum bytes retained between feeds while a token straddles a chunk
/// boundary. A single tag, text run, or entity longer than this fails the
/// parse instead of growing the carry buffer without bound.
const MAX_CARRY_BYTES: usize = 64 * 1024;

/// Re-entrant XML pump over externally supplied chunks.
///
/// Each call to [`feed`](XmlFeeder::feed) appends the chunk to an internal
/// carry buffer and parses as far as the buffered bytes allow. Events that
/// are provably complete are handed to the callback; a token cut off by the
/// chunk boundary stays in the buffer and is re-parsed on the next call.
/// [`finish`](XmlFeeder::finish) parses the remainder, at which point an
/// incomplete token is a real syntax error.
pub(crate) struct XmlFeeder {
    carry: Vec<u8>,
    max_carry: usize,
}

impl XmlFeeder {
    pub(crate) fn new() -> Self {
        Self::with_limit(MAX_CARRY_BYTES)
    }

    pub(crate) fn with_limit(max_carry: usize) -> Self {
        Self {
            carry: Vec::new(),
            max_carry,
        }
    }

    /// Append `chunk` and emit every event that is complete so far.
    pub(crate) fn feed<F>(&mut self, chunk: &[u8], handler: F) -> Result<(), EpubError>
    where
        F: FnMut(&Event<'_>, Decoder) -> Result<(), EpubError>,
    {
        self.carry.extend_from_slice(chunk);
        self.pump(false, handler)?;
        if self.carry.len() > self.max_carry {
            return Err(EpubError::Parse(format!(
                "XML token exceeds {} byte streaming buffer",
                self.max_carry
            )));
        }
        Ok(())
    }

    /// Parse the buffered remainder through end of input.
    pub(crate) fn finish<F>(&mut self, handler: F) -> Result<(), EpubError>
    where
        F: FnMut(&Event<'_>, Decoder) -> Result<(), EpubError>,
    {
        self.pump(true, handler)
    }

    /// Run quick-xml over the carry buffer, emitting complete events and
    /// draining the bytes they covered.
    ///
    /// Two cases hold an event back when `at_end` is false:
    /// - a parse error, which this close to the buffer edge usually means a
    ///   token was cut off mid-way and will complete on the next feed;
    /// - a `Text` event that runs to the end of the buffer, since the text
    ///   (or an entity reference starting it) may continue in the next chunk.
    ///
    /// Either way the unconsumed tail stays in `carry`. Errors that persist
    /// to `finish` are reported as [`EpubError::Parse`].
    fn pump<F>(&mut self, at_end: bool, mut handler: F) -> Result<(), EpubError>
    where
        F: FnMut(&Event<'_>, Decoder) -> Result<(), EpubError>,
    {
        let total = self.carry.len();
        let mut reader = Reader::from_reader(self.carry.as_slice());
        let config = reader.config_mut();
        // Text is delivered untrimmed so that runs interrupted by entity
        // references keep their interior spacing. Callers that capture text
        // trim at the capture boundary.
        // Earlier feeds already consumed the opening tags of enclosing
        // elements, so end tags in this window routinely have no visible
        // match. Name checking has to stay off for resumption to work.
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        let decoder = reader.decoder();

        let mut buf = Vec::new();
        let mut consumed = 0usize;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => {
                    consumed = total;
                    break;
                }
                Ok(event) => {
                    let pos = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
                    if !at_end && pos >= total && matches!(event, Event::Text(_)) {
                        break;
                    }
                    handler(&event, decoder)?;
                    consumed = pos.min(total);
                }
                Err(e) => {
                    if at_end {
                        let pos = usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX);
                        return Err(EpubError::Parse(format!(
                            "XML parse error at byte {}: {:?}",
                            pos, e
                        )));
                    }
                    break;
                }
            }
            buf.clear();
        }

        self.carry.drain(..consumed);
        Ok(())
    }
}
