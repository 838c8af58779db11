//! Crash-consistent file writes.

use crate::core::Result;
use crate::utils::fs::dirs::ensure_dir;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes `content` to `path` atomically.
///
/// The bytes go to a sibling temporary file which is synced to disk and then
/// renamed over the target. Readers observe either the previous content or the
/// new content, never a truncated mix of both.
///
/// # Errors
///
/// Returns [`crate::core::AbuError::IoError`] if the parent directory cannot be
/// created or any step of the write/rename fails. The temporary file is removed
/// on failure when possible.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = temp_path_for(path);

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()
    })();

    if let Err(e) = written.and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Serializes `value` as pretty JSON and writes it with [`atomic_write`].
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &content)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
