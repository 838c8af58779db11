//! Detached signature verification built on an injected trust capability.
//!
//! The cryptography itself lives behind [`TrustVerifier`]. This module owns the
//! scratch-file round trip and the interpretation of the trusted payload: a
//! bare hex digest for native packages, or a JSON object carrying a `sha256`
//! field for bundle manifests.

use crate::core::{AbuError, Result};
use crate::utils::fs::{ensure_parent_dir, remove_file_if_exists};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Verifies a detached signature stored in a file and returns its plaintext.
///
/// Implementations must fail with [`AbuError::VerificationFailed`] when the
/// signature does not check out. They may be slow or blocking; callers run
/// them on a blocking thread.
pub trait TrustVerifier: Send + Sync {
    /// Verify the signature blob at `signature_path` and return the embedded plaintext.
    fn verify_detached(&self, signature_path: &Path) -> Result<String>;
}

/// Drives a [`TrustVerifier`] and decodes the payload shapes the pipeline consumes.
#[derive(Clone)]
pub struct SignatureVerifier {
    trust: Arc<dyn TrustVerifier>,
}

impl SignatureVerifier {
    pub fn new(trust: Arc<dyn TrustVerifier>) -> Self {
        Self {
            trust,
        }
    }

    /// Writes `blob` to `scratch_path` and returns the trusted plaintext.
    ///
    /// Any stale file at `scratch_path` is deleted first. The scratch file's
    /// content after this call is unspecified.
    ///
    /// # Errors
    ///
    /// - [`AbuError::IoError`] if the scratch file cannot be written
    /// - [`AbuError::VerificationFailed`] if the capability rejects the signature
    pub async fn verify(&self, blob: &str, scratch_path: &Path) -> Result<String> {
        remove_file_if_exists(scratch_path)?;
        ensure_parent_dir(scratch_path)?;
        tokio::fs::write(scratch_path, blob).await?;

        let trust = Arc::clone(&self.trust);
        let path: PathBuf = scratch_path.to_path_buf();
        let payload = tokio::task::spawn_blocking(move || trust.verify_detached(&path))
            .await
            .map_err(|e| AbuError::IoError(std::io::Error::other(e)))??;

        debug!("Signature accepted ({} payload bytes)", payload.len());
        Ok(payload)
    }

    /// Verifies a package signature whose payload is a bare hex digest.
    pub async fn verify_digest(&self, blob: &str, scratch_path: &Path) -> Result<String> {
        let payload = self.verify(blob, scratch_path).await?;
        parse_digest_payload(&payload)
    }

    /// Verifies a bundle signature whose payload is `{"sha256": "<hex>"}`.
    ///
    /// The returned digest is the authenticated digest of `metadata.json`.
    pub async fn verify_manifest_digest(&self, blob: &str, scratch_path: &Path) -> Result<String> {
        let payload = self.verify(blob, scratch_path).await?;
        parse_manifest_payload(&payload)
    }
}

/// Extracts a SHA-256 hex digest from a package payload.
///
/// Accepts a bare digest or a `SHA256SUMS` style line whose first token is the
/// digest.
pub fn parse_digest_payload(payload: &str) -> Result<String> {
    let token = payload
        .split_whitespace()
        .next()
        .ok_or_else(|| AbuError::malformed("payload is empty"))?;

    if !is_sha256_hex(token) {
        return Err(AbuError::malformed(format!(
            "expected a 64 character hex digest, got '{}'",
            token.chars().take(80).collect::<String>()
        )));
    }

    Ok(token.to_ascii_lowercase())
}

#[derive(Deserialize)]
struct ManifestPayload {
    sha256: String,
}

/// Extracts the manifest digest from a bundle payload.
pub fn parse_manifest_payload(payload: &str) -> Result<String> {
    let parsed: ManifestPayload = serde_json::from_str(payload.trim())
        .map_err(|e| AbuError::malformed(format!("expected JSON with a sha256 field: {e}")))?;

    let digest = parsed.sha256.trim();
    if !is_sha256_hex(digest) {
        return Err(AbuError::malformed("sha256 field is not a 64 character hex digest"));
    }

    Ok(digest.to_ascii_lowercase())
}

pub(crate) fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
