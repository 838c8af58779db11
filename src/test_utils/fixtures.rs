//! Test fixtures for archives, bundles and signatures

use crate::constants::MANIFEST_FILE_NAME;
use crate::verification::{Ed25519TrustVerifier, Hasher, SignedEnvelope, TrustVerifier};
use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// One entry to write into a test archive.
#[derive(Debug, Clone, Copy)]
pub enum ZipEntry<'a> {
    /// Regular file: name and content
    File(&'a str, &'a [u8]),
    /// Directory entry; the name should end with `/`
    Dir(&'a str),
    /// Symlink entry: name and link target
    Symlink(&'a str, &'a str),
}

/// Writes a zip archive at `path` holding `entries` in order.
pub fn write_zip(path: &Path, entries: &[ZipEntry<'_>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for entry in entries {
        match *entry {
            ZipEntry::File(name, content) => {
                zip.start_file(name, options)?;
                zip.write_all(content)?;
            }
            ZipEntry::Dir(name) => zip.add_directory(name, options)?,
            ZipEntry::Symlink(name, target) => zip.add_symlink(name, target, options)?,
        }
    }

    zip.finish()?;
    Ok(())
}

/// Builder for a bundle archive with a `metadata.json` manifest.
#[derive(Debug, Clone, Default)]
pub struct BundleFixture {
    files: Vec<(String, Vec<u8>)>,
    untracked: Vec<(String, Vec<u8>)>,
    declared_only: Vec<(String, Vec<u8>)>,
    tampered: Vec<(String, Vec<u8>)>,
}

/// A bundle written to disk by [`BundleFixture::write_archive`].
#[derive(Debug, Clone)]
pub struct BuiltBundle {
    pub path: PathBuf,
    /// SHA-256 of the archive
    pub archive_digest: String,
    /// SHA-256 of `metadata.json` inside the archive
    pub manifest_digest: String,
    pub size: u64,
}

impl BundleFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry file plus one nested asset.
    pub fn standard() -> Self {
        Self::new()
            .with_file("main.jsbundle.hbc", b"hermes bytecode v1")
            .with_file("assets/images/logo.png", b"\x89PNG fake image")
    }

    /// File shipped and declared in the manifest.
    pub fn with_file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.push((name.to_string(), content.to_vec()));
        self
    }

    /// File shipped but missing from the manifest.
    pub fn with_untracked(mut self, name: &str, content: &[u8]) -> Self {
        self.untracked.push((name.to_string(), content.to_vec()));
        self
    }

    /// File declared in the manifest but not shipped.
    pub fn with_declared_only(mut self, name: &str, content: &[u8]) -> Self {
        self.declared_only.push((name.to_string(), content.to_vec()));
        self
    }

    /// File declared with `declared` but shipped with `shipped`.
    pub fn with_tampered(mut self, name: &str, declared: &[u8], shipped: &[u8]) -> Self {
        self.files.push((name.to_string(), shipped.to_vec()));
        self.tampered.push((name.to_string(), declared.to_vec()));
        self
    }

    /// The `metadata.json` content for this bundle.
    pub fn manifest_json(&self) -> String {
        let overrides: BTreeMap<&str, &[u8]> =
            self.tampered.iter().map(|(n, c)| (n.as_str(), c.as_slice())).collect();
        let entries: BTreeMap<&str, String> = self
            .files
            .iter()
            .chain(&self.declared_only)
            .map(|(name, content)| {
                let declared = overrides.get(name.as_str()).copied().unwrap_or(content.as_slice());
                (name.as_str(), Hasher::digest_bytes(declared))
            })
            .collect();
        serde_json::to_string_pretty(&entries).unwrap_or_default()
    }

    /// Writes the archive to `path`.
    pub fn write_archive(&self, path: &Path) -> Result<BuiltBundle> {
        let manifest = self.manifest_json();
        let mut entries = vec![ZipEntry::File(MANIFEST_FILE_NAME, manifest.as_bytes())];
        entries.extend(
            self.files.iter().chain(&self.untracked).map(|(n, c)| ZipEntry::File(n.as_str(), c.as_slice())),
        );
        write_zip(path, &entries)?;

        Ok(BuiltBundle {
            path: path.to_path_buf(),
            archive_digest: Hasher::digest_blocking(path)?,
            manifest_digest: Hasher::digest_bytes(manifest.as_bytes()),
            size: std::fs::metadata(path)?.len(),
        })
    }
}

/// Deterministic release signing key.
pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// Hex encoded verifying key of [`signing_key`], as written in config files.
pub fn public_key_hex() -> String {
    hex::encode(signing_key().verifying_key().to_bytes())
}

/// Trust capability accepting blobs signed by [`signing_key`].
pub fn trust() -> Arc<dyn TrustVerifier> {
    Arc::new(Ed25519TrustVerifier::new(signing_key().verifying_key()))
}

/// Bundle signature whose payload releases `manifest_digest`.
pub fn manifest_signature(manifest_digest: &str) -> String {
    let payload = serde_json::json!({ "sha256": manifest_digest }).to_string();
    seal(&payload)
}

/// Package signature whose payload is a `SHA256SUMS` line.
pub fn digest_signature(digest: &str, file_name: &str) -> String {
    seal(&format!("{digest}  {file_name}\n"))
}

fn seal(payload: &str) -> String {
    SignedEnvelope::seal(&signing_key(), payload).to_blob().unwrap_or_default()
}
