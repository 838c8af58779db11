//! Command-line interface for abu.
//!
//! # Commands
//!
//! - `install` - Download, verify, extract, validate and commit a bundle
//! - `download` - Download and digest-check a bundle without installing it
//! - `package` - Download and verify a native installer package
//! - `status` - Show which bundle the host would launch
//! - `fallbacks` - List bundles available for rollback
//! - `rollback` - Make a fallback bundle current
//! - `clear` - Remove downloads, or everything with `--all`
//! - `digest` - Print the SHA-256 of a file
//! - `compare` - Compare two dotted versions
//!
//! # Global options
//!
//! - `--verbose` / `--quiet` - Log level (debug / off; default info)
//! - `--config PATH` - Use a specific config file instead of `$ABU_CONFIG` or
//!   `<config_dir>/abu/config.toml`
//! - `--no-progress` - Disable progress bars (also `ABU_NO_PROGRESS`)
//!
//! Release inputs are the JSON documents produced by the update check:
//!
//! ```json
//! {
//!   "downloadUrl": "https://updates.example.com/bundles/1.2.0-37.zip",
//!   "filePath": "1.2.0-37.zip",
//!   "signature": "{\"payload\":\"...\",\"signature\":\"...\"}",
//!   "latestVersion": "1.2.0",
//!   "bundleVersion": 37,
//!   "sha256": "…",
//!   "fileSize": 10485760
//! }
//! ```

mod clear;
mod common;
mod digest;
mod install;
mod package;
mod rollback;
mod status;

use crate::config::UpdaterConfig;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub use common::CommandContext;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Log filter; `None` disables logging
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the stderr tracing subscriber.
    ///
    /// `RUST_LOG` takes precedence over the level chosen by flags. Repeated
    /// calls are ignored.
    pub fn init_logging(&self) {
        let Some(level) = &self.log_level else {
            return;
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Application bundle updater.
#[derive(Parser)]
#[command(
    name = "abu",
    about = "Download, verify and install application bundle updates",
    version,
    long_about = "abu fetches application bundles and native packages, verifies them against signed digests, \
                  installs bundles into versioned directories and keeps a bounded rollback history."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress everything except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a bundle release end to end
    Install(install::InstallCommand),
    /// Download a bundle archive without installing it
    Download(install::DownloadCommand),
    /// Download and verify a native package
    Package(package::PackageCommand),
    /// Show the bundle the host would launch
    Status(status::StatusCommand),
    /// List bundles available for rollback
    Fallbacks(status::FallbacksCommand),
    /// Roll back to a previously installed bundle
    Rollback(rollback::RollbackCommand),
    /// Remove downloaded artifacts
    Clear(clear::ClearCommand),
    /// Print the SHA-256 digest of a file
    Digest(digest::DigestCommand),
    /// Compare two dotted versions
    Compare(digest::CompareCommand),
}

impl Cli {
    /// Runs the parsed command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Runs the command with explicit settings instead of the parsed flags.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Install(cmd) => cmd.execute(&load_context(&config).await?).await,
            Commands::Download(cmd) => cmd.execute(&load_context(&config).await?).await,
            Commands::Package(cmd) => cmd.execute(&load_context(&config).await?).await,
            Commands::Status(cmd) => cmd.execute(&load_context(&config).await?).await,
            Commands::Fallbacks(cmd) => cmd.execute(&load_context(&config).await?),
            Commands::Rollback(cmd) => cmd.execute(&load_context(&config).await?).await,
            Commands::Clear(cmd) => cmd.execute(&load_context(&config).await?).await,
            Commands::Digest(cmd) => cmd.execute().await,
            Commands::Compare(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}

async fn load_context(config: &CliConfig) -> Result<CommandContext> {
    let settings = UpdaterConfig::load_with_optional(config.config_path.clone())
        .await
        .context("Failed to load configuration")?;
    Ok(CommandContext::new(settings, config.no_progress))
}
