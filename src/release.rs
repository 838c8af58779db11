//! Release descriptors and bundle pointers.
//!
//! The update-check collaborator hands the pipeline a loosely typed JSON
//! document ([`UpdateCheck`]). It is converted into an immutable
//! [`ReleaseDescriptor`] by validating constructors. Missing fields become
//! [`AbuError::ParamsInvalid`] instead of panics.
//!
//! A bundle is identified by its [`BundlePointer`], rendered as
//! `appVersion-bundleVersion`. The pointer names both the install directory and
//! the ledger signature key, so its components are restricted to characters
//! that are safe as a single path segment.

use crate::core::{AbuError, Result};
use crate::utils::path_validation::normalize_relative;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identifies one bundle build: `appVersion-bundleVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundlePointer {
    app_version: String,
    bundle_version: String,
}

impl BundlePointer {
    /// Builds a pointer after validating both components.
    ///
    /// # Errors
    ///
    /// [`AbuError::ParamsInvalid`] if a component is empty, is `.` or `..`,
    /// contains a path separator, or if the bundle version contains `-`.
    pub fn new(app_version: impl Into<String>, bundle_version: impl Into<String>) -> Result<Self> {
        let app_version = app_version.into();
        let bundle_version = bundle_version.into();

        validate_segment("appVersion", &app_version)?;
        validate_segment("bundleVersion", &bundle_version)?;
        if bundle_version.contains('-') {
            return Err(AbuError::params(format!(
                "bundleVersion '{bundle_version}' must not contain '-'"
            )));
        }

        Ok(Self {
            app_version,
            bundle_version,
        })
    }

    /// Parses `appVersion-bundleVersion`, splitting on the last `-`.
    pub fn parse(key: &str) -> Result<Self> {
        let (app, bundle) = key
            .rsplit_once('-')
            .ok_or_else(|| AbuError::params(format!("'{key}' is not an appVersion-bundleVersion key")))?;
        Self::new(app, bundle)
    }

    #[must_use]
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    #[must_use]
    pub fn bundle_version(&self) -> &str {
        &self.bundle_version
    }

    /// File name used for the staged archive.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{self}.zip")
    }
}

impl fmt::Display for BundlePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.app_version, self.bundle_version)
    }
}

impl FromStr for BundlePointer {
    type Err = AbuError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn validate_segment(field: &str, value: &str) -> Result<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_whitespace());
    if invalid {
        return Err(AbuError::params(format!("{field} '{value}' is not a valid version")));
    }
    Ok(())
}

/// A JSON scalar that may arrive either as a string or as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Number(n) => n
                .as_u64()
                .or_else(|| integral_float(n))
                .map_or_else(|| n.to_string(), |v| v.to_string()),
        }
    }

    fn as_size(&self) -> Option<u64> {
        match self {
            Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => n.as_u64().or_else(|| {
                n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)
            }),
        }
    }
}

/// `12.0` as `12`; fractional, negative and out-of-range values stay as they are.
fn integral_float(n: &serde_json::Number) -> Option<u64> {
    n.as_f64()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f < u64::MAX as f64)
        .map(|f| f as u64)
}

/// Raw update-check document.
///
/// ```json
/// {
///   "downloadUrl": "https://cdn.example.com/bundles/5.1.0-12.zip",
///   "filePath": "5.1.0-12.zip",
///   "signature": "{...}",
///   "latestVersion": "5.1.0",
///   "bundleVersion": 12,
///   "sha256": "…",
///   "fileSize": 10000000
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheck {
    pub download_url: Option<String>,
    pub file_path: Option<String>,
    pub signature: Option<String>,
    pub latest_version: Option<String>,
    pub bundle_version: Option<Scalar>,
    pub sha256: Option<String>,
    pub file_size: Option<Scalar>,
}

impl UpdateCheck {
    /// Parses the JSON document.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| AbuError::params(format!("update check is not valid JSON: {e}")))
    }

    /// Builds the descriptor of a bundle release. Every field is required.
    ///
    /// A relative `filePath` is placed under `staging_dir`.
    pub fn bundle_descriptor(&self, staging_dir: &Path) -> Result<ReleaseDescriptor> {
        let missing: Vec<&str> = [
            ("downloadUrl", self.download_url.is_none()),
            ("filePath", self.file_path.is_none()),
            ("signature", self.signature.is_none()),
            ("latestVersion", self.latest_version.is_none()),
            ("bundleVersion", self.bundle_version.is_none()),
            ("sha256", self.sha256.is_none()),
            ("fileSize", self.file_size.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(AbuError::params(format!("missing required fields: {}", missing.join(", "))));
        }

        let descriptor = ReleaseDescriptor {
            download_url: required_text("downloadUrl", self.download_url.as_deref())?,
            target_file_path: target_path(staging_dir, self.file_path.as_deref())?,
            expected_digest: required_digest(self.sha256.as_deref())?,
            detached_signature: self.signature.clone().filter(|s| !s.trim().is_empty()),
            app_version: required_text("latestVersion", self.latest_version.as_deref())?,
            bundle_version: self.bundle_version.as_ref().map(Scalar::as_text).unwrap_or_default(),
            declared_size: self
                .file_size
                .as_ref()
                .and_then(Scalar::as_size)
                .ok_or_else(|| AbuError::params("fileSize is not a non-negative number"))?,
        };
        descriptor.pointer()?;
        Ok(descriptor)
    }

    /// Builds the descriptor of a native package release.
    ///
    /// `downloadUrl`, `filePath` and `sha256` are required; a relative
    /// `filePath` is placed under `package_dir`.
    pub fn package_descriptor(&self, package_dir: &Path) -> Result<ReleaseDescriptor> {
        Ok(ReleaseDescriptor {
            download_url: required_text("downloadUrl", self.download_url.as_deref())?,
            target_file_path: target_path(package_dir, self.file_path.as_deref())?,
            expected_digest: required_digest(self.sha256.as_deref())?,
            detached_signature: self.signature.clone().filter(|s| !s.trim().is_empty()),
            app_version: self.latest_version.clone().unwrap_or_default(),
            bundle_version: self.bundle_version.as_ref().map(Scalar::as_text).unwrap_or_default(),
            declared_size: self.file_size.as_ref().and_then(Scalar::as_size).unwrap_or(0),
        })
    }
}

fn required_text(field: &str, value: Option<&str>) -> Result<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
        .ok_or_else(|| AbuError::params(format!("{field} is required")))
}

fn required_digest(value: Option<&str>) -> Result<String> {
    let digest = required_text("sha256", value)?;
    if !crate::verification::signature::is_sha256_hex(&digest) {
        return Err(AbuError::params("sha256 must be a 64 character hex digest"));
    }
    Ok(digest.to_ascii_lowercase())
}

fn target_path(base: &Path, file_path: Option<&str>) -> Result<PathBuf> {
    let file_path = required_text("filePath", file_path)?;
    let path = Path::new(&file_path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    normalize_relative(&file_path)
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| base.join(p))
        .ok_or_else(|| AbuError::params(format!("filePath '{file_path}' escapes the download directory")))
}

/// One candidate update, validated and immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    pub download_url: String,
    pub target_file_path: PathBuf,
    /// Lowercase hex SHA-256 of the artifact
    pub expected_digest: String,
    /// Opaque blob for the trust capability
    pub detached_signature: Option<String>,
    pub app_version: String,
    pub bundle_version: String,
    /// Advisory size used as the progress denominator
    pub declared_size: u64,
}

impl ReleaseDescriptor {
    /// The bundle pointer this release installs to.
    pub fn pointer(&self) -> Result<BundlePointer> {
        BundlePointer::new(self.app_version.clone(), self.bundle_version.clone())
    }
}
