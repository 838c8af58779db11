//! Cross-process lock around ledger commits.
//!
//! The lock file lives in `<data_dir>/.locks/<name>.lock` and is held with an
//! exclusive `fs4` lock until the guard is dropped. Two processes (for example
//! the host app and the CLI) therefore never interleave a fallback-list write
//! with a pointer update.

use crate::core::{AbuError, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive lock released on drop.
pub struct LedgerLock {
    _file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Blocks (on a blocking thread) until the named lock is acquired.
    pub async fn acquire(data_dir: &Path, name: &str) -> Result<Self> {
        let locks_dir = data_dir.join(".locks");
        tokio::fs::create_dir_all(&locks_dir).await?;

        let lock_path = locks_dir.join(format!("{name}.lock"));
        let lock_path_clone = lock_path.clone();

        let file = tokio::task::spawn_blocking(move || -> Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&lock_path_clone)?;

            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| AbuError::IoError(std::io::Error::other(e)))??;

        debug!("Acquired lock {}", lock_path.display());
        Ok(Self {
            _file: file,
            path: lock_path,
        })
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        #[allow(unstable_name_collisions)]
        if let Err(e) = self._file.unlock() {
            warn!("Failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
