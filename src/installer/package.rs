//! Native package pipeline.
//!
//! Packages are opaque installer files. The pipeline downloads one, checks its
//! digest against the release descriptor and against the digest released by
//! its signature, and leaves it ready for the platform installer. Launching
//! that installer is out of scope.
//!
//! A package signature is either carried by the release descriptor or fetched
//! from the `<downloadUrl>.SHA256SUMS.asc` sidecar.

use super::state::InstallState::{Committing, Downloading, Installed, Verifying};
use super::{DownloadOutcome, Pipeline, SignaturePolicy, cached_artifact_matches, discard_on_rejection, verify_download};
use crate::config::{Layout, UpdaterConfig};
use crate::constants::{PACKAGE_SCRATCH_FILE, SIGNATURE_SIDECAR_SUFFIX};
use crate::core::{AbuError, Result};
use crate::download::{DownloadSession, Downloader, InFlightGuard};
use crate::events::{Attempt, EventSink, NullSink};
use crate::release::ReleaseDescriptor;
use crate::utils::fs::atomic_write;
use crate::verification::{Hasher, SignatureVerifier, TrustVerifier};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A package verified and ready for the platform installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInstall {
    pub path: PathBuf,
    pub digest: String,
    /// Whether the digest was released by a verified signature
    pub signed: bool,
}

/// Downloads and verifies native installer packages.
pub struct PackageUpdater {
    layout: Layout,
    downloader: Downloader,
    verifier: Option<SignatureVerifier>,
    signature_policy: SignaturePolicy,
    session: DownloadSession,
    sink: Arc<dyn EventSink>,
}

impl PackageUpdater {
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        let updater = Self::new(config, config.downloader()?);
        Ok(match config.trust_verifier()? {
            Some(trust) => updater.with_trust(trust),
            None => updater,
        })
    }

    pub fn new(config: &UpdaterConfig, downloader: Downloader) -> Self {
        Self {
            layout: config.layout(),
            downloader,
            verifier: None,
            signature_policy: config.signature_policy,
            session: DownloadSession::new("package", config.single_flight.package),
            sink: Arc::new(NullSink),
        }
    }

    #[must_use]
    pub fn with_trust(mut self, trust: Arc<dyn TrustVerifier>) -> Self {
        self.verifier = Some(SignatureVerifier::new(trust));
        self
    }

    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn session(&self) -> &DownloadSession {
        &self.session
    }

    /// Downloads the package and checks it against the descriptor digest.
    ///
    /// # Errors
    ///
    /// [`AbuError::SingleFlightRejected`] while another package download runs
    /// (the default package policy).
    pub async fn download(&self, descriptor: &ReleaseDescriptor) -> Result<DownloadOutcome> {
        let Some(guard) = self.session.begin()? else {
            return Ok(DownloadOutcome::Joined);
        };

        let mut pipeline = Pipeline::new(package_label(descriptor));
        let mut attempt = Attempt::start(Arc::clone(&self.sink));
        let result = self.stage(descriptor, &guard, &mut pipeline, &mut attempt).await;
        let result = pipeline.settle(result);
        attempt.finish(&result);
        result
    }

    /// Returns the package signature, fetching the sidecar when the descriptor has none.
    ///
    /// A fetched sidecar is also stored next to the package as
    /// `<file>.SHA256SUMS.asc`.
    pub async fn fetch_signature(&self, descriptor: &ReleaseDescriptor) -> Result<String> {
        if let Some(signature) = &descriptor.detached_signature {
            return Ok(signature.clone());
        }

        let url = format!("{}{SIGNATURE_SIDECAR_SUFFIX}", descriptor.download_url);
        debug!("Fetching package signature from {url}");
        let signature = self.downloader.fetch_text(&url).await?;
        atomic_write(&sidecar_path(&descriptor.target_file_path), signature.as_bytes())?;
        Ok(signature)
    }

    /// Checks the downloaded package against the descriptor and the signed digest.
    ///
    /// The package is deleted when either check fails.
    pub async fn verify(&self, descriptor: &ReleaseDescriptor, signature: Option<&str>) -> Result<PackageInstall> {
        let path = &descriptor.target_file_path;
        verify_download(path, &descriptor.expected_digest).await?;

        let trusted = self.trusted_digest(signature).await;
        let trusted = discard_on_rejection(path, trusted)?;

        let actual = Hasher::digest(path).await?;
        if let Some(trusted) = &trusted {
            let checked = if Hasher::matches(&actual, trusted) {
                Ok(())
            } else {
                Err(AbuError::verification(format!(
                    "package digest {actual} does not match signed digest {trusted}"
                )))
            };
            discard_on_rejection(path, checked)?;
        }

        Ok(PackageInstall {
            path: path.clone(),
            digest: actual,
            signed: trusted.is_some(),
        })
    }

    /// Downloads and verifies a package, leaving it ready to install.
    pub async fn install(&self, descriptor: &ReleaseDescriptor) -> Result<Option<PackageInstall>> {
        let Some(guard) = self.session.begin()? else {
            return Ok(None);
        };

        let mut pipeline = Pipeline::new(package_label(descriptor));
        let mut attempt = Attempt::start(Arc::clone(&self.sink));
        let result = self.run(descriptor, &guard, &mut pipeline, &mut attempt).await;
        let result = pipeline.settle(result);
        attempt.finish(&result);
        result.map(Some)
    }

    async fn run(
        &self,
        descriptor: &ReleaseDescriptor,
        guard: &InFlightGuard<'_>,
        pipeline: &mut Pipeline,
        attempt: &mut Attempt,
    ) -> Result<PackageInstall> {
        self.stage(descriptor, guard, pipeline, attempt).await?;

        let signature = match (&descriptor.detached_signature, &self.verifier) {
            (Some(signature), _) => Some(signature.clone()),
            (None, Some(_)) => match self.fetch_signature(descriptor).await {
                Ok(signature) => Some(signature),
                Err(AbuError::HttpError {
                    code: 404,
                    ..
                }) => None,
                Err(e) => return Err(e),
            },
            (None, None) => None,
        };
        let package = self.verify(descriptor, signature.as_deref()).await?;

        pipeline.advance(Committing)?;
        info!("Package {} is ready to install", package.path.display());
        pipeline.advance(Installed)?;
        Ok(package)
    }

    async fn stage(
        &self,
        descriptor: &ReleaseDescriptor,
        guard: &InFlightGuard<'_>,
        pipeline: &mut Pipeline,
        attempt: &mut Attempt,
    ) -> Result<DownloadOutcome> {
        let target = &descriptor.target_file_path;

        if cached_artifact_matches(target, &descriptor.expected_digest).await? {
            info!("Reusing downloaded package {}", target.display());
            pipeline.advance(Verifying)?;
            attempt.progress(100);
            return Ok(DownloadOutcome::Cached);
        }

        pipeline.advance(Downloading)?;
        let bytes = self
            .downloader
            .fetch(
                &descriptor.download_url,
                target,
                descriptor.declared_size,
                guard.token(),
                &mut |percent| attempt.progress(percent),
            )
            .await?;

        pipeline.advance(Verifying)?;
        verify_download(target, &descriptor.expected_digest).await?;
        Ok(DownloadOutcome::Downloaded {
            bytes,
        })
    }

    async fn trusted_digest(&self, signature: Option<&str>) -> Result<Option<String>> {
        match (signature, &self.verifier) {
            (Some(blob), Some(verifier)) => {
                let scratch = self.layout.scratch_dir.join(PACKAGE_SCRATCH_FILE);
                verifier.verify_digest(blob, &scratch).await.map(Some)
            }
            (Some(_), None) => match self.signature_policy {
                SignaturePolicy::Required => Err(AbuError::ConfigError {
                    message: "package is signed but no public_key is configured".to_string(),
                }),
                SignaturePolicy::Optional => {
                    self.signature_policy.unsigned("no public_key is configured to check the package signature")
                }
            },
            (None, _) => self.signature_policy.unsigned("package has no signature"),
        }
    }

    /// Cancels a running download. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        self.session.cancel()
    }
}

fn package_label(descriptor: &ReleaseDescriptor) -> String {
    descriptor
        .target_file_path
        .file_name()
        .map_or_else(|| "package".to_string(), |name| name.to_string_lossy().into_owned())
}

/// `<path>.SHA256SUMS.asc`
fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(SIGNATURE_SIDECAR_SUFFIX);
    PathBuf::from(name)
}
