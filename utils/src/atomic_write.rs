//! Whole-file replacement via temp file + rename.
//!
//! Readers of the target see either the old contents or the new contents.
//! The temp file lives in the target's directory so the rename stays on one
//! filesystem.
//!
//! Nothing here logs. The log store calls this while holding the lock its own
//! tracing sink needs.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicWriteOptions {
    /// `fsync` the new contents before the rename.
    pub sync_data: bool,
    /// Carry the replaced file's permission bits over (Unix only).
    pub preserve_permissions: bool,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            sync_data: true,
            preserve_permissions: true,
        }
    }
}

pub fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> io::Result<()> {
    atomic_write_with(path, bytes, AtomicWriteOptions::default())
}

pub fn atomic_write_with(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let tmp = write_temp(path, bytes, options)?;
    persist(tmp, path)
}

/// Replace `path` and return a handle to the new file opened with `open`.
///
/// The handle is opened on the temp file before the rename, so once the new
/// contents are visible there is nothing left that can fail.
pub fn atomic_write_and_open(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
    open: &OpenOptions,
) -> io::Result<File> {
    let path = path.as_ref();
    let tmp = write_temp(path, bytes, options)?;
    let file = open.open(tmp.path())?;
    persist(tmp, path)?;
    Ok(file)
}

fn write_temp(path: &Path, bytes: &[u8], options: AtomicWriteOptions) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let previous = if options.preserve_permissions {
        fs::metadata(path).ok().map(|meta| meta.permissions())
    } else {
        None
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    if let Some(perms) = previous {
        fs::set_permissions(tmp.path(), perms)?;
    }

    tmp.write_all(bytes)?;
    if options.sync_data {
        tmp.as_file().sync_all()?;
    }
    Ok(tmp)
}

// On failure the temp file is removed when the returned handle drops.
fn persist(tmp: NamedTempFile, path: &Path) -> io::Result<()> {
    tmp.persist(path).map(drop).map_err(|err| err.error)
}
