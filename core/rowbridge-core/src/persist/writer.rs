//! Local file I/O with stage-then-replace writes.

use crate::error::{BridgeError, BridgeResult};
use crate::format::NamedBlob;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` with `bytes`.
///
/// The content is written to a temporary file in the same directory, synced,
/// then renamed over the target, so readers see either the old or the new
/// file and never a partial one. On error the prior file is untouched.
pub fn write_staged(path: &Path, bytes: &[u8]) -> BridgeResult<()> {
    let location = path.display().to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged =
        NamedTempFile::new_in(dir).map_err(|err| BridgeError::storage(&location, err))?;
    staged
        .write_all(bytes)
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|err| BridgeError::storage(&location, err))?;
    staged
        .persist(path)
        .map_err(|err| BridgeError::storage(&location, err.error))?;
    Ok(())
}

/// File content, or `None` when the file does not exist.
pub fn read_local(path: &Path) -> BridgeResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(BridgeError::storage(path.display().to_string(), err)),
    }
}

/// Regular files directly inside `dir`, sorted by name.
pub fn read_dir_files(dir: &Path) -> BridgeResult<Vec<NamedBlob>> {
    let location = dir.display().to_string();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| BridgeError::storage(&location, err))? {
        let entry = entry.map_err(|err| BridgeError::storage(&location, err))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path)
            .map_err(|err| BridgeError::storage(path.display().to_string(), err))?;
        files.push(NamedBlob {
            name: entry.file_name().to_string_lossy().into_owned(),
            bytes,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
