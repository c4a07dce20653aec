//! Integration tests for ink-epub
//!
//! Every test builds its EPUB fixture in memory and writes it to a
//! temporary file, so the suite runs without checked-in binary fixtures.

use std::path::{Path, PathBuf};

use ink_epub::{Epub, EpubError, ZipError};

// -- Fixture builder ----------------------------------------------------------

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Build a ZIP archive with all entries stored uncompressed.
fn build_epub(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = Vec::new();
    let mut cd = Vec::new();

    for (name, data) in entries {
        let offset = zip.len() as u32;
        let crc = crc32fast::hash(data);

        push_u32(&mut zip, 0x04034b50);
        push_u16(&mut zip, 20);
        push_u16(&mut zip, 0);
        push_u16(&mut zip, 0); // stored
        push_u16(&mut zip, 0);
        push_u16(&mut zip, 0);
        push_u32(&mut zip, crc);
        push_u32(&mut zip, data.len() as u32);
        push_u32(&mut zip, data.len() as u32);
        push_u16(&mut zip, name.len() as u16);
        push_u16(&mut zip, 0);
        zip.extend_from_slice(name.as_bytes());
        zip.extend_from_slice(data);

        push_u32(&mut cd, 0x02014b50);
        push_u16(&mut cd, 20);
        push_u16(&mut cd, 20);
        push_u16(&mut cd, 0);
        push_u16(&mut cd, 0); // stored
        push_u16(&mut cd, 0);
        push_u16(&mut cd, 0);
        push_u32(&mut cd, crc);
        push_u32(&mut cd, data.len() as u32);
        push_u32(&mut cd, data.len() as u32);
        push_u16(&mut cd, name.len() as u16);
        push_u16(&mut cd, 0);
        push_u16(&mut cd, 0);
        push_u16(&mut cd, 0);
        push_u16(&mut cd, 0);
        push_u32(&mut cd, 0);
        push_u32(&mut cd, offset);
        cd.extend_from_slice(name.as_bytes());
    }

    let cd_offset = zip.len() as u32;
    let cd_size = cd.len() as u32;
    let count = entries.len() as u16;
    zip.extend_from_slice(&cd);
    push_u32(&mut zip, 0x06054b50);
    push_u16(&mut zip, 0);
    push_u16(&mut zip, 0);
    push_u16(&mut zip, count);
    push_u16(&mut zip, count);
    push_u32(&mut zip, cd_size);
    push_u32(&mut zip, cd_offset);
    push_u16(&mut zip, 0);
    zip
}

fn write_epub(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_epub(entries)).expect("Failed to write fixture EPUB");
    path
}

const CONTAINER_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const OPF_XML: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>The Time Machine</dc:title>
    <dc:creator>H. G. Wells</dc:creator>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="intro" href="text/intro.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="intro"/>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const NCX_XML: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <docTitle><text>The Time Machine</text></docTitle>
  <navMap>
    <navPoint id="n1" playOrder="1">
      <navLabel><text>Introduction</text></navLabel>
      <content src="text/intro.xhtml"/>
    </navPoint>
    <navPoint id="n2" playOrder="2">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="text/ch1.xhtml"/>
      <navPoint id="n2a" playOrder="3">
        <navLabel><text>The Machine Itself</text></navLabel>
        <content src="text/ch1.xhtml#machine"/>
      </navPoint>
    </navPoint>
    <navPoint id="n3" playOrder="4">
      <navLabel><text>Chapter Two</text></navLabel>
      <content src="text/ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

const INTRO_LEN: usize = 500;
const CH1_LEN: usize = 1500;
const CH2_LEN: usize = 3000;

fn standard_book(dir: &Path) -> PathBuf {
    let intro = vec![b'i'; INTRO_LEN];
    let ch1 = vec![b'1'; CH1_LEN];
    let ch2 = vec![b'2'; CH2_LEN];
    write_epub(
        dir,
        "time-machine.epub",
        &[
            ("mimetype", b"application/epub+zip"),
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", OPF_XML),
            ("OEBPS/toc.ncx", NCX_XML),
            ("OEBPS/images/cover.jpg", b"\xff\xd8 jpeg bytes"),
            ("OEBPS/text/intro.xhtml", &intro),
            ("OEBPS/text/ch1.xhtml", &ch1),
            ("OEBPS/text/ch2.xhtml", &ch2),
        ],
    )
}

// -- Full load pipeline -------------------------------------------------------

#[test]
fn test_load_full_pipeline() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    assert_eq!(book.title(), "The Time Machine");
    assert_eq!(book.cover_href(), "OEBPS/images/cover.jpg");

    assert_eq!(book.spine_count(), 3);
    assert_eq!(book.spine_href(0), "OEBPS/text/intro.xhtml");
    assert_eq!(book.spine_href(1), "OEBPS/text/ch1.xhtml");
    assert_eq!(book.spine_href(2), "OEBPS/text/ch2.xhtml");

    assert_eq!(book.toc_count(), 4);
    let labels: Vec<&str> = (0..book.toc_count())
        .map(|i| book.toc_entry(i).expect("TOC entry in range").label.as_str())
        .collect();
    assert_eq!(
        labels,
        [
            "Introduction",
            "Chapter One",
            "The Machine Itself",
            "Chapter Two"
        ]
    );
}

#[test]
fn test_cumulative_size_invariants() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    let sizes = book.cumulative_sizes();
    assert_eq!(sizes.len(), book.spine_count());
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*sizes.last().unwrap(), book.book_size());
    assert_eq!(
        book.book_size(),
        (INTRO_LEN + CH1_LEN + CH2_LEN) as u64
    );
}

#[test]
fn test_progress_spans_zero_to_hundred() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    let last = book.spine_count() - 1;
    assert_eq!(book.progress_percent(0, 0.0), Ok(0));
    assert_eq!(book.progress_percent(last, 1.0), Ok(100));

    // 500 + 0.5 * 1500 = 1250 of 5000 bytes.
    assert_eq!(book.progress_percent(1, 0.5), Ok(25));
}

#[test]
fn test_resources_readable_after_load() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    let cover = book
        .read_resource(book.cover_href())
        .expect("Failed to read cover");
    assert_eq!(cover, b"\xff\xd8 jpeg bytes");

    let mut sink = Vec::new();
    let written = book
        .stream_resource("OEBPS/text/ch1.xhtml", &mut sink, 256)
        .expect("Failed to stream chapter");
    assert_eq!(written, CH1_LEN as u64);
    assert_eq!(sink, vec![b'1'; CH1_LEN]);
}

// -- TOC to spine mapping -----------------------------------------------------

#[test]
fn test_toc_spine_mapping_is_exact_string_match() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    assert_eq!(book.spine_index_for_toc_index(0), 0);
    assert_eq!(book.spine_index_for_toc_index(1), 1);
    assert_eq!(book.spine_index_for_toc_index(3), 2);

    // The nested entry targets "text/ch1.xhtml#machine"; the fragment makes
    // it unequal to every spine href, so it maps to the book start.
    assert_eq!(
        book.toc_entry(2).expect("entry in range").href,
        "OEBPS/text/ch1.xhtml#machine"
    );
    assert_eq!(book.spine_index_for_toc_index(2), 0);

    assert_eq!(book.toc_index_for_spine_index(0), Some(0));
    assert_eq!(book.toc_index_for_spine_index(1), Some(1));
    assert_eq!(book.toc_index_for_spine_index(2), Some(3));
}

// -- Container resolution -----------------------------------------------------

#[test]
fn test_container_prefers_package_media_type() {
    let container = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="print/book.pdf" media-type="application/pdf"/>
    <rootfile full-path="book.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
    // OPF at the archive root, so spine hrefs resolve without a prefix.
    let opf = br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Rootless</dc:title>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
  </spine>
</package>"#;
    let ncx = br#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/">
  <navMap>
    <navPoint id="n1"><navLabel><text>One</text></navLabel><content src="ch1.xhtml"/></navPoint>
  </navMap>
</ncx>"#;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_epub(
        dir.path(),
        "rootless.epub",
        &[
            ("META-INF/container.xml", container),
            ("book.opf", opf),
            ("toc.ncx", ncx),
            ("ch1.xhtml", b"<html>chapter one</html>"),
        ],
    );

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    assert_eq!(book.title(), "Rootless");
    assert_eq!(book.spine_href(0), "ch1.xhtml");
    assert_eq!(book.toc_entry(0).expect("entry").href, "ch1.xhtml");
}

#[test]
fn test_entry_lookup_tolerates_case_differences() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let intro = vec![b'i'; 100];
    let path = write_epub(
        dir.path(),
        "cased.epub",
        &[
            // Some packaging tools emit the container path with odd casing.
            ("META-INF/Container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", OPF_XML),
            ("OEBPS/toc.ncx", NCX_XML),
            ("OEBPS/text/intro.xhtml", &intro),
            ("OEBPS/text/ch1.xhtml", b"one"),
            ("OEBPS/text/ch2.xhtml", b"two"),
        ],
    );

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");
    assert_eq!(book.title(), "The Time Machine");
}

// -- EPUB 3 navigation fallback -----------------------------------------------

#[test]
fn test_nav_document_used_when_ncx_absent() {
    let opf = br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Nav Only</dc:title>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;
    let nav = br#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="landmarks">
    <ol><li><a href="ch2.xhtml">Skip to the end</a></li></ol>
  </nav>
  <nav epub:type="toc">
    <ol>
      <li><a href="ch1.xhtml">Part <em>One</em></a></li>
      <li><a href="ch2.xhtml">Part Two</a></li>
    </ol>
  </nav>
</body>
</html>"#;

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_epub(
        dir.path(),
        "navonly.epub",
        &[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", opf),
            ("OEBPS/nav.xhtml", nav),
            ("OEBPS/ch1.xhtml", b"<html>one</html>"),
            ("OEBPS/ch2.xhtml", b"<html>two</html>"),
        ],
    );

    let mut book = Epub::new(&path, dir.path().join("cache"));
    book.load().expect("Failed to load EPUB");

    assert_eq!(book.toc_count(), 2);
    assert_eq!(book.toc_entry(0).expect("entry").label, "Part One");
    assert_eq!(book.toc_entry(0).expect("entry").href, "OEBPS/ch1.xhtml");
    assert_eq!(book.toc_entry(1).expect("entry").label, "Part Two");
}

// -- Failure handling ---------------------------------------------------------

#[test]
fn test_missing_container_fails_cleanly() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_epub(
        dir.path(),
        "bare.epub",
        &[("mimetype", b"application/epub+zip")],
    );

    let mut book = Epub::new(&path, dir.path().join("cache"));
    assert_eq!(
        book.load().unwrap_err(),
        EpubError::Zip(ZipError::FileNotFound)
    );
    assert_eq!(book.title(), "");
    assert_eq!(book.spine_count(), 0);
    assert_eq!(book.toc_count(), 0);
}

#[test]
fn test_malformed_package_document_is_parse_error() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = write_epub(
        dir.path(),
        "mangled.epub",
        &[
            ("META-INF/container.xml", CONTAINER_XML),
            ("OEBPS/content.opf", b"<package><manifest><<<"),
        ],
    );

    let mut book = Epub::new(&path, dir.path().join("cache"));
    assert!(matches!(book.load().unwrap_err(), EpubError::Parse(_)));
    assert_eq!(book.spine_count(), 0);
}

#[test]
fn test_truncated_archive_is_rejected() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let bytes = std::fs::read(&path).expect("Failed to read fixture");
    let cut = dir.path().join("cut.epub");
    std::fs::write(&cut, &bytes[..bytes.len() / 2]).expect("Failed to write truncated file");

    let mut book = Epub::new(&cut, dir.path().join("cache"));
    assert!(matches!(book.load().unwrap_err(), EpubError::Zip(_)));
}

// -- Cache directories --------------------------------------------------------

#[test]
fn test_cache_directory_lifecycle() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = standard_book(dir.path());

    let book = Epub::new(&path, dir.path().join("cache"));
    assert_eq!(
        book.cache_path(),
        dir.path().join("cache").join("time-machine")
    );

    book.setup_cache_dir().expect("Failed to create cache dir");
    assert!(book.cache_path().is_dir());
    std::fs::write(book.cache_path().join("layout.bin"), b"derived").unwrap();

    book.clear_cache().expect("Failed to clear cache dir");
    assert!(!book.cache_path().exists());

    book.clear_cache().expect("Clearing a cleared cache should succeed");
}
