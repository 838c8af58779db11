//! Install orchestration for both artifact classes.
//!
//! - [`BundleUpdater`]: zip bundles that are extracted, validated against
//!   their manifest and committed to the [`crate::ledger::VersionLedger`]
//! - [`PackageUpdater`]: native packages that are downloaded and verified,
//!   then handed to the platform installer
//!
//! Each updater owns its own [`crate::download::DownloadSession`], so the two
//! classes never block each other. Progress and completion are reported
//! through an [`crate::events::EventSink`].

mod bundle;
mod package;
mod state;

pub use bundle::{BundleEntry, BundleInstall, BundleUpdater};
pub use package::{PackageInstall, PackageUpdater};
pub use state::{InstallState, Pipeline};

use crate::core::{AbuError, Result};
use crate::utils::fs::remove_file_if_exists;
use crate::verification::Hasher;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Whether an artifact without a usable signature may be installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePolicy {
    /// Unsigned artifacts fail verification
    #[default]
    Required,
    /// Unsigned artifacts are installed with a warning; digests are still checked
    Optional,
}

impl SignaturePolicy {
    /// Decides what to do when no signature can be checked.
    ///
    /// Returns `Ok(None)` (no trusted digest) when the policy allows it.
    pub(crate) fn unsigned(self, reason: &str) -> Result<Option<String>> {
        match self {
            Self::Required => Err(AbuError::verification(format!(
                "{reason} and signatures are required"
            ))),
            Self::Optional => {
                warn!("{reason}; continuing without signature authentication");
                Ok(None)
            }
        }
    }
}

/// What a download step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The artifact was transferred and its digest verified
    Downloaded {
        bytes: u64,
    },
    /// A file with the expected digest was already in place
    Cached,
    /// Another attempt of the same class was running; nothing was done
    Joined,
}

/// Whether `path` already holds a file with digest `expected`.
pub(crate) async fn cached_artifact_matches(path: &Path, expected: &str) -> Result<bool> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(false);
    }
    match Hasher::digest(path).await {
        Ok(actual) => {
            let matches = Hasher::matches(&actual, expected);
            debug!("Cached artifact {} digest matches: {matches}", path.display());
            Ok(matches)
        }
        Err(e) => {
            warn!("Ignoring unreadable cached artifact {}: {e}", path.display());
            Ok(false)
        }
    }
}

/// Checks a downloaded file against its expected digest, deleting it on mismatch.
pub(crate) async fn verify_download(path: &Path, expected: &str) -> Result<()> {
    let result = Hasher::verify_file(path, expected).await;
    discard_on_rejection(path, result)
}

/// Deletes `path` when `result` is a signature or digest rejection.
pub(crate) fn discard_on_rejection<T>(path: &Path, result: Result<T>) -> Result<T> {
    if matches!(&result, Err(AbuError::VerificationFailed { .. } | AbuError::PayloadMalformed { .. })) {
        warn!("Deleting rejected artifact {}", path.display());
        remove_file_if_exists(path)?;
    }
    result
}
