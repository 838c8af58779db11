//! Streaming SHA-256 digests.
//!
//! Files are hashed through a fixed [`STREAM_BUFFER_SIZE`] buffer so memory use
//! does not depend on file size. A read error at any offset aborts the digest;
//! no value is ever returned for a prefix of a file.

use crate::constants::STREAM_BUFFER_SIZE;
use crate::core::{AbuError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Computes and compares content digests.
pub struct Hasher;

impl Hasher {
    /// Returns the lowercase hex SHA-256 of the file at `path`.
    ///
    /// # Errors
    ///
    /// [`AbuError::IoError`] if the file cannot be opened or a read fails
    /// part way through.
    pub async fn digest(path: &Path) -> Result<String> {
        debug!("Computing SHA256 for {}", path.display());

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Blocking variant of [`Hasher::digest`] for use inside `spawn_blocking`.
    pub fn digest_blocking(path: &Path) -> Result<String> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];

        loop {
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Digest of an in-memory buffer.
    #[must_use]
    pub fn digest_bytes(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Case-insensitive comparison of two hex digests.
    #[must_use]
    pub fn matches(actual: &str, expected: &str) -> bool {
        actual.trim().eq_ignore_ascii_case(expected.trim())
    }

    /// Fails with [`AbuError::VerificationFailed`] unless the file at `path`
    /// hashes to `expected`.
    pub async fn verify_file(path: &Path, expected: &str) -> Result<()> {
        let actual = Self::digest(path).await?;
        if !Self::matches(&actual, expected) {
            return Err(AbuError::verification(format!(
                "digest mismatch for {}: expected {expected}, got {actual}",
                path.display()
            )));
        }
        Ok(())
    }
}
