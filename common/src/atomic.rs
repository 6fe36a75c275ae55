//! Stage-then-rename file writes.
//!
//! Readers of a file written through [`write_atomic`] observe either the old
//! contents or the new contents, never a partial write.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Write `contents` to `path` by persisting a sibling temporary file over it.
///
/// Parent directories are created as needed. The temporary file lives in the
/// same directory so the final rename never crosses filesystems.
///
/// # Errors
///
/// Returns any I/O error raised while creating, writing, syncing, or renaming
/// the temporary file. On error the temporary file is removed and `path` keeps
/// its previous contents.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".nvup-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    staged.write_all(contents)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|err| err.error)?;
    Ok(())
}
