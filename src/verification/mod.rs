//! Integrity and provenance checks.
//!
//! - [`digest`]: streaming SHA-256 over files ([`Hasher`])
//! - [`signature`]: detached signature round trip through an injected
//!   [`TrustVerifier`] and decoding of the trusted payload
//! - [`envelope`]: the built-in Ed25519 [`TrustVerifier`]
//!
//! Nothing downloaded is trusted until its digest matches a value that either
//! came from the release descriptor or was released by a verified signature.

pub mod digest;
pub mod envelope;
pub mod signature;

pub use digest::Hasher;
pub use envelope::{Ed25519TrustVerifier, SignedEnvelope};
pub use signature::{SignatureVerifier, TrustVerifier, parse_digest_payload, parse_manifest_payload};
