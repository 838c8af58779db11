//! Bundle install pipeline.
//!
//! A bundle is a zip archive holding the application code plus a
//! `metadata.json` manifest. Installing one runs
//! download → digest check → signature check → extraction → manifest
//! validation → ledger commit, driven by a [`Pipeline`].
//!
//! The signature payload carries the digest of `metadata.json`, so the manifest
//! is authenticated before any of its entries are trusted. Every file the
//! manifest declares is then hashed individually.

use super::state::InstallState::{
    Committing, Downloading, Extracting, Installed, ValidatingManifest, Verifying,
};
use super::{DownloadOutcome, Pipeline, SignaturePolicy, cached_artifact_matches, discard_on_rejection, verify_download};
use crate::archive::ArchiveExtractor;
use crate::config::{Layout, UpdaterConfig};
use crate::constants::{BUNDLE_SCRATCH_FILE, WEB_EMBED_DIR_NAME};
use crate::core::{AbuError, Result};
use crate::download::{DownloadSession, Downloader, InFlightGuard};
use crate::events::{Attempt, EventSink, NullSink};
use crate::ledger::{CommitOutcome, FallbackEntry, NativeCheck, VersionLedger};
use crate::manifest::{Manifest, ManifestValidator, ValidationReport};
use crate::release::{BundlePointer, ReleaseDescriptor};
use crate::utils::fs::remove_dir_if_exists;
use crate::utils::path_validation::resolve_within;
use crate::verification::{Hasher, SignatureVerifier, TrustVerifier};
use crate::version::compare_versions;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`BundleUpdater::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleInstall {
    Installed {
        pointer: BundlePointer,
        commit: CommitOutcome,
        report: ValidationReport,
    },
    /// Another bundle install was already running
    Joined,
}

/// Launch-time view of the current bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEntry {
    /// The entry file is present and matches the authenticated manifest
    Ready {
        pointer: BundlePointer,
        path: PathBuf,
    },
    /// No bundle is installed
    NoBundle,
    /// The host's native version changed and the bundle was invalidated
    NativeChanged,
    /// The current bundle failed validation and must not be launched
    Rejected {
        pointer: BundlePointer,
        reason: String,
    },
}

/// Downloads, validates and installs application bundles.
pub struct BundleUpdater {
    layout: Layout,
    downloader: Downloader,
    verifier: Option<SignatureVerifier>,
    signature_policy: SignaturePolicy,
    validator: ManifestValidator,
    ledger: VersionLedger,
    session: DownloadSession,
    sink: Arc<dyn EventSink>,
    entry_file: String,
}

impl BundleUpdater {
    /// Builds an updater with the ledger, HTTP client and trust key from `config`.
    pub fn from_config(config: &UpdaterConfig) -> Result<Self> {
        let updater = Self::new(config, config.open_ledger()?, config.downloader()?);
        Ok(match config.trust_verifier()? {
            Some(trust) => updater.with_trust(trust),
            None => updater,
        })
    }

    pub fn new(config: &UpdaterConfig, ledger: VersionLedger, downloader: Downloader) -> Self {
        Self {
            layout: config.layout(),
            downloader,
            verifier: None,
            signature_policy: config.signature_policy,
            validator: ManifestValidator::new(config.untracked_policy()),
            ledger,
            session: DownloadSession::new("bundle", config.single_flight.bundle),
            sink: Arc::new(NullSink),
            entry_file: config.entry_file.clone(),
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
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    #[must_use]
    pub fn session(&self) -> &DownloadSession {
        &self.session
    }

    /// Downloads the archive and checks its digest.
    ///
    /// A second call while one is running follows the bundle single-flight
    /// policy: by default it returns [`DownloadOutcome::Joined`] at once.
    pub async fn download_bundle(&self, descriptor: &ReleaseDescriptor) -> Result<DownloadOutcome> {
        let pointer = descriptor.pointer()?;
        let Some(guard) = self.session.begin()? else {
            return Ok(DownloadOutcome::Joined);
        };

        let mut pipeline = Pipeline::new(pointer.to_string());
        let mut attempt = Attempt::start(Arc::clone(&self.sink));
        let result = self.stage(descriptor, &guard, &mut pipeline, &mut attempt).await;
        let result = pipeline.settle(result);
        attempt.finish(&result);
        result
    }

    /// Checks the staged archive, extracts it and validates it against its manifest.
    ///
    /// On failure the extracted directory is left behind as untrusted residue;
    /// the next extraction of the same pointer removes it first.
    pub async fn verify_bundle(&self, descriptor: &ReleaseDescriptor) -> Result<ValidationReport> {
        let pointer = descriptor.pointer()?;
        let mut pipeline = Pipeline::new(pointer.to_string());
        let result = self.verify_staged(descriptor, &pointer, &mut pipeline).await;
        pipeline.settle(result)
    }

    async fn verify_staged(
        &self,
        descriptor: &ReleaseDescriptor,
        pointer: &BundlePointer,
        pipeline: &mut Pipeline,
    ) -> Result<ValidationReport> {
        pipeline.advance(Verifying)?;
        verify_download(&descriptor.target_file_path, &descriptor.expected_digest).await?;
        let trusted = self.authenticate_archive(descriptor).await?;
        self.unpack_and_validate(pointer, &descriptor.target_file_path, trusted.as_deref(), pipeline).await
    }

    /// Commits an extracted bundle as current.
    ///
    /// The directory is authenticated and validated again first, so residue
    /// from a failed [`BundleUpdater::verify_bundle`] is never committed.
    pub async fn install_bundle(
        &self,
        descriptor: &ReleaseDescriptor,
        native_version: &str,
    ) -> Result<CommitOutcome> {
        let pointer = descriptor.pointer()?;
        let dir = self.ledger.bundle_dir(&pointer);
        if !dir.is_dir() {
            return Err(AbuError::params(format!("bundle {pointer} has not been extracted")));
        }

        let mut pipeline = Pipeline::new(pointer.to_string());
        let result = self.commit_extracted(descriptor, &pointer, &dir, native_version, &mut pipeline).await;
        pipeline.settle(result)
    }

    async fn commit_extracted(
        &self,
        descriptor: &ReleaseDescriptor,
        pointer: &BundlePointer,
        dir: &Path,
        native_version: &str,
        pipeline: &mut Pipeline,
    ) -> Result<CommitOutcome> {
        pipeline.advance(Verifying)?;
        let trusted = self.authenticate_archive(descriptor).await?;
        pipeline.advance(ValidatingManifest)?;
        self.validate_extracted(pointer, dir, &descriptor.target_file_path, trusted.as_deref()).await?;

        pipeline.advance(Committing)?;
        self.warn_on_downgrade(pointer)?;
        let commit = self
            .ledger
            .commit(pointer, descriptor.detached_signature.as_deref(), native_version)
            .await?;
        pipeline.advance(Installed)?;
        Ok(commit)
    }

    /// Runs the whole pipeline for one release.
    pub async fn install(&self, descriptor: &ReleaseDescriptor, native_version: &str) -> Result<BundleInstall> {
        let pointer = descriptor.pointer()?;
        let Some(guard) = self.session.begin()? else {
            return Ok(BundleInstall::Joined);
        };

        let mut pipeline = Pipeline::new(pointer.to_string());
        let mut attempt = Attempt::start(Arc::clone(&self.sink));
        let result = self.run(descriptor, &pointer, native_version, &guard, &mut pipeline, &mut attempt).await;
        let result = pipeline.settle(result);
        attempt.finish(&result);
        result
    }

    async fn run(
        &self,
        descriptor: &ReleaseDescriptor,
        pointer: &BundlePointer,
        native_version: &str,
        guard: &InFlightGuard<'_>,
        pipeline: &mut Pipeline,
        attempt: &mut Attempt,
    ) -> Result<BundleInstall> {
        self.stage(descriptor, guard, pipeline, attempt).await?;
        let trusted = self.authenticate_archive(descriptor).await?;
        let report = self
            .unpack_and_validate(pointer, &descriptor.target_file_path, trusted.as_deref(), pipeline)
            .await?;

        pipeline.advance(Committing)?;
        self.warn_on_downgrade(pointer)?;
        let commit = self
            .ledger
            .commit(pointer, descriptor.detached_signature.as_deref(), native_version)
            .await?;
        pipeline.advance(Installed)?;

        Ok(BundleInstall::Installed {
            pointer: pointer.clone(),
            commit,
            report,
        })
    }

    /// Gets a digest-checked archive to the staging path, reusing a cached one.
    async fn stage(
        &self,
        descriptor: &ReleaseDescriptor,
        guard: &InFlightGuard<'_>,
        pipeline: &mut Pipeline,
        attempt: &mut Attempt,
    ) -> Result<DownloadOutcome> {
        let target = &descriptor.target_file_path;

        if cached_artifact_matches(target, &descriptor.expected_digest).await? {
            info!("Reusing downloaded archive {}", target.display());
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

    /// Resolves the signed manifest digest, deleting the archive if the signature is rejected.
    async fn authenticate_archive(&self, descriptor: &ReleaseDescriptor) -> Result<Option<String>> {
        let result = self.trusted_manifest_digest(descriptor.detached_signature.as_deref()).await;
        discard_on_rejection(&descriptor.target_file_path, result)
    }

    async fn trusted_manifest_digest(&self, signature: Option<&str>) -> Result<Option<String>> {
        match (signature, &self.verifier) {
            (Some(blob), Some(verifier)) => {
                let scratch = self.layout.scratch_dir.join(BUNDLE_SCRATCH_FILE);
                verifier.verify_manifest_digest(blob, &scratch).await.map(Some)
            }
            (Some(_), None) => match self.signature_policy {
                SignaturePolicy::Required => Err(AbuError::ConfigError {
                    message: "bundle is signed but no public_key is configured".to_string(),
                }),
                SignaturePolicy::Optional => {
                    self.signature_policy.unsigned("no public_key is configured to check the bundle signature")
                }
            },
            (None, _) => self.signature_policy.unsigned("bundle has no signature"),
        }
    }

    async fn unpack_and_validate(
        &self,
        pointer: &BundlePointer,
        archive: &Path,
        trusted_digest: Option<&str>,
        pipeline: &mut Pipeline,
    ) -> Result<ValidationReport> {
        let dest = self.ledger.bundle_dir(pointer);
        let is_current = self.ledger.current_pointer()?.as_ref() == Some(pointer);

        if is_current && dest.is_dir() {
            info!("Bundle {pointer} is already current; validating it in place");
        } else {
            pipeline.advance(Extracting)?;
            if dest.exists() {
                debug!("Removing leftover directory {}", dest.display());
                remove_dir_if_exists(&dest)?;
            }
            ArchiveExtractor::extract(archive, &dest).await?;
        }

        pipeline.advance(ValidatingManifest)?;
        self.validate_extracted(pointer, &dest, archive, trusted_digest).await
    }

    /// Authenticates the manifest in `dir` and checks every file against it.
    ///
    /// `archive` is deleted when the manifest does not match the signed digest.
    async fn validate_extracted(
        &self,
        pointer: &BundlePointer,
        dir: &Path,
        archive: &Path,
        trusted_digest: Option<&str>,
    ) -> Result<ValidationReport> {
        let manifest = Manifest::load_authenticated(dir, trusted_digest).await;
        let manifest = discard_on_rejection(archive, manifest)?;
        let report = self.validator.validate(dir, &manifest).await?;
        info!(
            "Validated bundle {pointer}: {} files verified, {} untracked",
            report.verified,
            report.untracked.len()
        );
        Ok(report)
    }

    fn warn_on_downgrade(&self, pointer: &BundlePointer) -> Result<()> {
        let Some(current) = self.ledger.current_pointer()? else {
            return Ok(());
        };
        let ordering = compare_versions(Some(pointer.app_version()), Some(current.app_version()))
            .then_with(|| compare_versions(Some(pointer.bundle_version()), Some(current.bundle_version())));
        if ordering == Ordering::Less {
            warn!("Installing bundle {pointer} over newer bundle {current}");
        }
        Ok(())
    }

    /// Cancels a running download. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        self.session.cancel()
    }

    pub fn fallbacks(&self) -> Result<Vec<FallbackEntry>> {
        self.ledger.read_fallbacks()
    }

    /// Rolls back to a bundle from the fallback stack.
    pub async fn switch_to_fallback(&self, pointer: &BundlePointer) -> Result<FallbackEntry> {
        self.ledger.switch_to_fallback(pointer).await
    }

    /// Finds the entry file the host should launch.
    ///
    /// Runs the native-version check, authenticates the current manifest
    /// against the stored signature and checks the entry file's digest.
    /// Validation failures are reported as [`BundleEntry::Rejected`].
    pub async fn current_bundle_entry(&self, native_version: &str) -> Result<BundleEntry> {
        match self.ledger.invalidate_if_native_mismatch(native_version)? {
            NativeCheck::NoBundle => return Ok(BundleEntry::NoBundle),
            NativeCheck::Invalidated => return Ok(BundleEntry::NativeChanged),
            NativeCheck::Valid => {}
        }
        let Some(pointer) = self.ledger.current_pointer()? else {
            return Ok(BundleEntry::NoBundle);
        };

        match self.entry_path(&pointer).await {
            Ok(path) => Ok(BundleEntry::Ready {
                pointer,
                path,
            }),
            Err(e) => {
                warn!("Current bundle {pointer} is not launchable: {e}");
                Ok(BundleEntry::Rejected {
                    pointer,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Directory of the web assets embedded in the current bundle.
    ///
    /// `None` when no bundle is current or its directory is gone, in which
    /// case the host uses the assets it was built with.
    pub fn web_embed_path(&self) -> Result<Option<PathBuf>> {
        let Some(pointer) = self.ledger.current_pointer()? else {
            return Ok(None);
        };
        let dir = self.ledger.bundle_dir(&pointer);
        Ok(dir.is_dir().then(|| dir.join(WEB_EMBED_DIR_NAME)))
    }

    async fn entry_path(&self, pointer: &BundlePointer) -> Result<PathBuf> {
        let dir = self.ledger.bundle_dir(pointer);
        if !dir.is_dir() {
            return Err(AbuError::manifest(dir.display().to_string(), "bundle directory does not exist"));
        }

        let signature = self.ledger.signature_for(pointer)?;
        let trusted = self.trusted_manifest_digest(signature.as_deref()).await?;
        let manifest = Manifest::load_authenticated(&dir, trusted.as_deref()).await?;
        let expected = manifest
            .get(&self.entry_file)
            .ok_or_else(|| AbuError::manifest(self.entry_file.as_str(), "entry file is not declared"))?;

        let path = resolve_within(&dir.canonicalize()?, &self.entry_file)?;
        Hasher::verify_file(&path, expected).await?;
        Ok(path)
    }

    /// Removes staged archives and verification scratch files.
    ///
    /// # Errors
    ///
    /// [`AbuError::SingleFlightRejected`] while a bundle download is running.
    pub fn clear_downloads(&self) -> Result<()> {
        if self.session.is_in_flight() {
            return Err(AbuError::SingleFlightRejected {
                class: self.session.class().to_string(),
            });
        }
        remove_dir_if_exists(&self.layout.staging_dir)?;
        remove_dir_if_exists(&self.layout.scratch_dir)?;
        info!("Cleared bundle downloads");
        Ok(())
    }

    /// Removes downloads, installed bundles and all ledger state.
    pub async fn clear_all(&self) -> Result<()> {
        self.clear_downloads()?;
        self.ledger.clear().await
    }
}
