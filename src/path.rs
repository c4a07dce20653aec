//! Archive path canonicalisation
//!
//! Every lookup against the archive goes through `normalize_path` so that
//! hrefs resolved from the OPF or NCX (which may contain `.` and `..`
//! segments) address the same entry regardless of how they were spelled.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

/// Collapse a `/`-separated archive path into canonical form.
///
/// Empty segments and `.` are dropped, `..` pops the previous segment
/// (a no-op at the root, so `../a` becomes `a`). The result never has a
/// leading or trailing slash. Applying the function twice yields the
/// same string as applying it once.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    parts.join("/")
}

/// Directory prefix of `path` through the last `/`, including the slash.
///
/// Returns an empty string when `path` has no directory component, so the
/// OPF base path can be prepended to hrefs with plain concatenation.
pub fn base_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos + 1],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_parent_segments() {
        assert_eq!(normalize_path("a/b/../c"), "a/c");
        assert_eq!(normalize_path("OEBPS/../images/cover.jpg"), "images/cover.jpg");
    }

    #[test]
    fn test_normalize_parent_at_root_is_dropped() {
        assert_eq!(normalize_path("../a"), "a");
        assert_eq!(normalize_path("../../a/b"), "a/b");
    }

    #[test]
    fn test_normalize_drops_empty_and_dot_segments() {
        assert_eq!(normalize_path("/a//b/./c"), "a/b/c");
        assert_eq!(normalize_path("./mimetype"), "mimetype");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["a/b/../c", "../a", "/x//y/./z", "OEBPS/text/ch1.xhtml", ""] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once);
        }
    }

    #[test]
    fn test_normalize_preserves_fragments_verbatim() {
        // Fragments are not archive syntax; the segment keeps its `#` suffix.
        assert_eq!(normalize_path("OEBPS/ch1.xhtml#s2"), "OEBPS/ch1.xhtml#s2");
    }

    #[test]
    fn test_base_dir() {
        assert_eq!(base_dir("OEBPS/content.opf"), "OEBPS/");
        assert_eq!(base_dir("a/b/c.opf"), "a/b/");
        assert_eq!(base_dir("content.opf"), "");
    }
}
