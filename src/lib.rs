//! abu - application bundle updater
//!
//! Downloads application bundles and native packages, verifies them against
//! SHA-256 digests released by detached Ed25519 signatures, installs bundles
//! into versioned directories and keeps a bounded history of previous bundles
//! for rollback.
//!
//! # Pipeline
//!
//! A bundle install walks a fixed state machine:
//!
//! ```text
//! Idle -> Downloading -> Verifying -> Extracting -> ValidatingManifest -> Committing -> Installed
//!            \______________\______________\_______________\_______________\-> Failed
//! ```
//!
//! A cached archive whose digest already matches skips `Downloading`; a
//! package skips extraction and manifest validation.
//!
//! # Modules
//!
//! ## Pipeline stages
//! - [`download`] - Streaming HTTP transfer, progress and single-flight sessions
//! - [`verification`] - SHA-256 hashing and signature verification
//! - [`archive`] - Zip extraction with traversal checks
//! - [`manifest`] - Bundle manifest parsing and tree validation
//! - [`ledger`] - Current pointer, signatures, native version and fallbacks
//! - [`installer`] - Bundle and package orchestration
//!
//! ## Supporting modules
//! - [`config`] - `config.toml` settings and on-disk layout
//! - [`core`] - Error taxonomy and user-facing error context
//! - [`events`] - Progress and completion events
//! - [`release`] - Update-check documents and bundle pointers
//! - [`version`] - Dotted version comparison
//! - [`utils`] - Filesystem, path and progress helpers
//! - [`cli`] - The `abu` command
//!
//! # Example
//!
//! ```rust,no_run
//! use abu_cli::config::UpdaterConfig;
//! use abu_cli::installer::BundleUpdater;
//! use abu_cli::release::UpdateCheck;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load().await?;
//! let check = UpdateCheck::from_json(&std::fs::read_to_string("release.json")?)?;
//! let descriptor = check.bundle_descriptor(&config.layout().staging_dir)?;
//!
//! let updater = BundleUpdater::from_config(&config)?;
//! updater.install(&descriptor, "5.0.0").await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod download;
pub mod events;
pub mod installer;
pub mod ledger;
pub mod manifest;
pub mod release;
pub mod utils;
pub mod verification;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
