//! Whole-document file I/O used by every store.
//!
//! Writers buffer the complete new document, write it to a temp file in the
//! target directory and rename it over the destination, so a failed write
//! never leaves a half-written config behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use log::trace;

use super::error::{StoreError, StoreResult};

/// Read a text file, mapping "does not exist" to `None`.
pub fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Replace `path` with `contents` atomically (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(path, e))?;
    temp.write_all(contents.as_bytes())
        .map_err(|e| StoreError::io(path, e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(path, e))?;
    temp.persist(path).map_err(|e| StoreError::io(path, e.error))?;

    trace!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}
