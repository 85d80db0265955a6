//! Temp-file-then-rename persistence for config and log files

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `path` through a sibling temp file so readers never see partial content.
///
/// The closure receives the temp file; on success the file is flushed, synced and
/// renamed over `path`. On failure the temp file is removed when dropped.
pub fn atomic_write_with<F>(path: &Path, write: F) -> std::io::Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(&mut tmp)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically replace `path` with `contents`
pub fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    atomic_write_with(path, |file| file.write_all(contents))
}
