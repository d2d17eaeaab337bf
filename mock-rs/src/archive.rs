//! Tar helpers for shipping example directories over the control protocol

use crate::errors::{MockError, Result};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tar::{Archive, Builder};

/// Content type the upload route accepts
pub const TAR_CONTENT_TYPE: &str = "application/x-tar";

/// Archive the contents of `dir` (not the directory itself) into memory
pub fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    if !dir.is_dir() {
        return Err(MockError::NotFound(format!(
            "Examples directory not found: {}",
            dir.display()
        )));
    }

    let mut tar = Builder::new(Vec::new());

    // Don't follow symlinks (prevents broken symlink errors)
    tar.follow_symlinks(false);

    tar.append_dir_all("", dir)
        .map_err(|e| MockError::Archive(format!("Failed to add directory to tarball: {}", e)))?;

    tar.into_inner()
        .map_err(|e| MockError::Archive(format!("Failed to finish tarball: {}", e)))
}

/// Remove every top-level entry below `dir`, leaving `dir` itself in place
pub fn clear_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Replace the contents of `dir` with the entries of a tar archive
pub fn replace_dir_contents(dir: &Path, archive: &[u8]) -> Result<()> {
    clear_dir(dir)?;

    let mut archive = Archive::new(Cursor::new(archive));
    archive
        .unpack(dir)
        .map_err(|e| MockError::Archive(format!("Failed to extract tarball: {}", e)))
}
