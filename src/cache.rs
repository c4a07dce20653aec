//! Per-book cache directory management
//!
//! Chapter renderers and cover decoders park derived artifacts next to
//! the book. These helpers own the lifecycle of that directory.

extern crate alloc;

use alloc::format;
use std::fs;
use std::path::Path;

use crate::error::EpubError;

/// Create `path` and every missing parent. Idempotent.
pub fn ensure_dir(path: &Path) -> Result<(), EpubError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| EpubError::Io(format!("Failed to create {}: {}", path.display(), e)))?;
    log::debug!("[EPUB] Created cache dir {}", path.display());
    Ok(())
}

/// Recursively remove `path`. A directory that does not exist counts as
/// already cleared.
pub fn clear_dir(path: &Path) -> Result<(), EpubError> {
    if !path.exists() {
        log::debug!("[EPUB] Cache dir {} does not exist, no action needed", path.display());
        return Ok(());
    }
    fs::remove_dir_all(path)
        .map_err(|e| EpubError::Io(format!("Failed to clear {}: {}", path.display(), e)))?;
    log::debug!("[EPUB] Cleared cache dir {}", path.display());
    Ok(())
}
