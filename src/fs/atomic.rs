//! Atomic file replacement for stored documents.
//!
//! A document file is never observed half-written: content goes to a hidden
//! temporary file in the same directory, is synced, and is then renamed over
//! the target. Readers scanning a collection skip dot-files, so a temporary
//! left behind by a crash is invisible to them.
//!
//! Source and destination must be on the same filesystem for the rename to be
//! atomic, which holds because the temporary lives next to the target.

use crate::error::{LeaseholdError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Atomically write bytes to a file, creating parent directories as needed.
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|e| LeaseholdError::io("failed to create directory", parent, e))?;
    }

    let temp_path = temp_path_for(path)?;
    write_and_sync(&temp_path, content)?;
    replace(&temp_path, path)
}

/// Remove a file, reporting whether it existed.
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<bool> {
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LeaseholdError::io("failed to remove file", path, e)),
    }
}

/// Hidden temporary beside the target: `.{filename}.{pid}.tmp`.
fn temp_path_for(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LeaseholdError::UserError(format!("invalid file path '{}'", target.display())))?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, std::process::id())))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| LeaseholdError::io("failed to create temporary file", path, e))?;

    if let Err(e) = file.write_all(content).and_then(|()| file.sync_all()) {
        let _ = fs::remove_file(path);
        return Err(LeaseholdError::io("failed to write temporary file", path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn replace(source: &Path, target: &Path) -> Result<()> {
    if let Err(e) = fs::rename(source, target) {
        let _ = fs::remove_file(source);
        return Err(LeaseholdError::io("failed to replace", target, e));
    }

    // Persist the directory entry as well.
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(not(unix))]
fn replace(source: &Path, target: &Path) -> Result<()> {
    // std::fs::rename replaces an existing target on Windows via MoveFileExW
    // with MOVEFILE_REPLACE_EXISTING.
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        LeaseholdError::io("failed to replace", target, e)
    })
}
