//! Bundle manifests (`metadata.json`) and per-file validation.
//!
//! A manifest is a flat JSON object mapping bundle-relative paths to lowercase
//! hex SHA-256 digests. It is shipped inside the bundle archive, so its content
//! is only trusted once its own digest matches the digest released by the
//! bundle signature (see [`Manifest::load_authenticated`]).
//!
//! # Validation rules
//!
//! [`ManifestValidator`] walks an installed bundle directory and checks:
//!
//! - every declared entry exists as a regular file and hashes to its digest
//! - no symlinks are present anywhere in the tree
//! - `metadata.json` itself and OS artifacts (`.DS_Store`, `__MACOSX/`, ...) are skipped
//! - files not declared in the manifest are reported, and rejected only when
//!   the validator runs with [`UntrackedPolicy::Reject`]

use crate::constants::{MANIFEST_FILE_NAME, OS_ARTIFACT_DIRS, OS_ARTIFACT_NAMES};
use crate::core::{AbuError, Result};
use crate::utils::path_validation::{normalize_relative, resolve_within};
use crate::verification::Hasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Parsed `metadata.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Parses manifest JSON.
    ///
    /// Keys are normalized (`./a` becomes `a`) and digests lowercased.
    ///
    /// # Errors
    ///
    /// [`AbuError::ManifestValidationFailed`] if the content is not a flat
    /// string-to-string object, a key escapes the bundle root, or a value is
    /// not a SHA-256 hex digest.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> = serde_json::from_str(content).map_err(|e| {
            AbuError::manifest(MANIFEST_FILE_NAME, format!("not a flat JSON object: {e}"))
        })?;

        let mut entries = BTreeMap::new();
        for (key, digest) in raw {
            let relative = normalize_relative(&key)
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| AbuError::manifest(&key, "entry escapes the bundle root"))?;
            if !crate::verification::signature::is_sha256_hex(digest.trim()) {
                return Err(AbuError::manifest(&key, "digest is not a SHA-256 hex string"));
            }
            entries.insert(to_manifest_key(&relative), digest.trim().to_ascii_lowercase());
        }

        Ok(Self {
            entries,
        })
    }

    /// Reads `metadata.json` from `bundle_dir` and authenticates it.
    ///
    /// When `trusted_digest` is given, the raw manifest bytes must hash to it.
    /// The same bytes are then parsed, so the checked content is exactly the
    /// content used.
    ///
    /// # Errors
    ///
    /// - [`AbuError::ManifestValidationFailed`] if the file is missing or malformed
    /// - [`AbuError::VerificationFailed`] if the digest does not match
    pub async fn load_authenticated(bundle_dir: &Path, trusted_digest: Option<&str>) -> Result<Self> {
        let path = bundle_dir.join(MANIFEST_FILE_NAME);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AbuError::manifest(MANIFEST_FILE_NAME, "file is missing"));
            }
            Err(e) => return Err(e.into()),
        };

        match trusted_digest {
            Some(expected) => {
                let actual = Hasher::digest_bytes(&bytes);
                if !Hasher::matches(&actual, expected) {
                    return Err(AbuError::verification(format!(
                        "{MANIFEST_FILE_NAME} digest {actual} does not match signed digest {expected}"
                    )));
                }
                debug!("Authenticated {} against signed digest", path.display());
            }
            None => warn!("Loading {} without signature authentication", path.display()),
        }

        let content = String::from_utf8(bytes)
            .map_err(|_| AbuError::manifest(MANIFEST_FILE_NAME, "content is not UTF-8"))?;
        Self::parse(&content)
    }

    /// Expected digest for a bundle-relative path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k, v.to_ascii_lowercase())).collect(),
        }
    }
}

/// What to do with files present on disk but absent from the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntrackedPolicy {
    /// Log and accept them
    #[default]
    Ignore,
    /// Fail validation
    Reject,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of declared files whose digest matched
    pub verified: usize,
    /// Files found on disk that the manifest does not declare
    pub untracked: Vec<String>,
}

/// Validates an extracted bundle tree against its manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestValidator {
    policy: UntrackedPolicy,
}

impl ManifestValidator {
    #[must_use]
    pub const fn new(policy: UntrackedPolicy) -> Self {
        Self {
            policy,
        }
    }

    /// Walks `bundle_dir` and checks it against `manifest`.
    ///
    /// Runs on a blocking thread.
    pub async fn validate(&self, bundle_dir: &Path, manifest: &Manifest) -> Result<ValidationReport> {
        let validator = *self;
        let dir = bundle_dir.to_path_buf();
        let manifest = manifest.clone();
        tokio::task::spawn_blocking(move || validator.validate_blocking(&dir, &manifest))
            .await
            .map_err(std::io::Error::other)?
    }

    /// Synchronous form of [`ManifestValidator::validate`].
    pub fn validate_blocking(&self, bundle_dir: &Path, manifest: &Manifest) -> Result<ValidationReport> {
        if !bundle_dir.is_dir() {
            return Err(AbuError::manifest(
                bundle_dir.display().to_string(),
                "bundle directory does not exist",
            ));
        }
        let root = bundle_dir.canonicalize()?;
        let mut report = ValidationReport::default();

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_artifact_dir(e));

        for entry in walker {
            let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|_| AbuError::manifest(entry.path().display().to_string(), "outside bundle"))?;
            let key = to_manifest_key(relative);

            if entry.file_type().is_symlink() {
                return Err(AbuError::manifest(key, "symlinks are not allowed in a bundle"));
            }
            if !entry.file_type().is_file() || is_skipped_file(relative) {
                continue;
            }

            if manifest.get(&key).is_none() {
                match self.policy {
                    UntrackedPolicy::Ignore => {
                        debug!("Ignoring untracked bundle file {key}");
                        report.untracked.push(key);
                    }
                    UntrackedPolicy::Reject => {
                        return Err(AbuError::manifest(key, "file is not declared in the manifest"));
                    }
                }
            }
        }

        for (key, expected) in manifest.iter() {
            let path = resolve_within(&root, key)
                .map_err(|_| AbuError::manifest(key, "entry escapes the bundle root"))?;
            let is_file = path.symlink_metadata().is_ok_and(|m| m.file_type().is_file());
            if !is_file {
                return Err(AbuError::manifest(key, "declared file is missing"));
            }

            let actual = Hasher::digest_blocking(&path)?;
            if !Hasher::matches(&actual, expected) {
                return Err(AbuError::manifest(
                    key,
                    format!("digest mismatch: expected {expected}, got {actual}"),
                ));
            }
            report.verified += 1;
        }

        info!(
            "Validated {} files in {} ({} untracked)",
            report.verified,
            bundle_dir.display(),
            report.untracked.len()
        );
        Ok(report)
    }
}

/// Joins path components with `/`, the separator used in manifests.
fn to_manifest_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_artifact_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|name| OS_ARTIFACT_DIRS.contains(&name))
}

fn is_skipped_file(relative: &Path) -> bool {
    if relative == Path::new(MANIFEST_FILE_NAME) {
        return true;
    }
    relative
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| OS_ARTIFACT_NAMES.contains(&name))
}
