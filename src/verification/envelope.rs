//! Ed25519 signed envelopes, the built-in [`TrustVerifier`].
//!
//! A release signature is a small JSON document:
//!
//! ```json
//! { "payload": "{\"sha256\":\"...\"}", "signature": "<base64 Ed25519 signature>" }
//! ```
//!
//! The signature covers the UTF-8 bytes of `payload`. Release tooling produces
//! envelopes with [`SignedEnvelope::seal`].

use crate::core::{AbuError, Result};
use crate::verification::signature::TrustVerifier;
use base64::{Engine as _, engine::general_purpose};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Wire format of a detached signature blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Plaintext released to the pipeline once the signature checks out.
    pub payload: String,
    /// Base64 encoded Ed25519 signature over `payload`.
    pub signature: String,
}

impl SignedEnvelope {
    /// Signs `payload` and returns the envelope.
    #[must_use]
    pub fn seal(signing_key: &SigningKey, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let signature = signing_key.sign(payload.as_bytes());
        Self {
            payload,
            signature: general_purpose::STANDARD.encode(signature.to_bytes()),
        }
    }

    /// Serializes the envelope into the blob format stored in the ledger.
    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn parsed_signature(&self) -> Result<Signature> {
        let raw = general_purpose::STANDARD
            .decode(self.signature.trim().as_bytes())
            .map_err(|e| AbuError::verification(format!("malformed base64 signature: {e}")))?;

        let array: [u8; 64] = raw
            .try_into()
            .map_err(|_| AbuError::verification("signature must be 64 bytes"))?;
        Ok(Signature::from_bytes(&array))
    }
}

/// Verifies [`SignedEnvelope`] blobs against one trusted public key.
pub struct Ed25519TrustVerifier {
    key: VerifyingKey,
}

impl Ed25519TrustVerifier {
    pub const fn new(key: VerifyingKey) -> Self {
        Self {
            key,
        }
    }

    /// Builds a verifier from a 32 byte public key encoded as base64 or hex.
    ///
    /// # Errors
    ///
    /// [`AbuError::ConfigError`] if the key cannot be decoded or is not a valid
    /// Ed25519 point.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let bytes = if encoded.len() == 64 && encoded.bytes().all(|b| b.is_ascii_hexdigit()) {
            hex::decode(encoded).map_err(|e| config_error(e.to_string()))?
        } else {
            general_purpose::STANDARD.decode(encoded).map_err(|e| config_error(e.to_string()))?
        };

        let array: [u8; 32] =
            bytes.try_into().map_err(|_| config_error("public key must be 32 bytes".into()))?;
        let key = VerifyingKey::from_bytes(&array).map_err(|e| config_error(e.to_string()))?;
        Ok(Self::new(key))
    }

    /// Verifies an in-memory blob.
    pub fn verify_blob(&self, blob: &str) -> Result<String> {
        let envelope: SignedEnvelope = serde_json::from_str(blob.trim())
            .map_err(|e| AbuError::verification(format!("unreadable signature envelope: {e}")))?;
        let signature = envelope.parsed_signature()?;

        self.key
            .verify(envelope.payload.as_bytes(), &signature)
            .map_err(|_| AbuError::verification("signature does not match the trusted key"))?;

        Ok(envelope.payload)
    }
}

impl TrustVerifier for Ed25519TrustVerifier {
    fn verify_detached(&self, signature_path: &Path) -> Result<String> {
        let blob = std::fs::read_to_string(signature_path)?;
        self.verify_blob(&blob)
    }
}

fn config_error(message: String) -> AbuError {
    AbuError::ConfigError {
        message: format!("invalid public key: {message}"),
    }
}
