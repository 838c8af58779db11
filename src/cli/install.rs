//! Bundle install and download commands.

use super::common::{CommandContext, read_update_check};
use crate::installer::{BundleInstall, BundleUpdater, DownloadOutcome};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

/// Install a bundle from an update-check response.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Update-check JSON describing the release
    file: PathBuf,

    /// Native version of the running host
    #[arg(long)]
    native_version: String,
}

impl InstallCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let check = read_update_check(&self.file).await?;
        let descriptor = check.bundle_descriptor(&ctx.config.layout().staging_dir)?;
        let (bar, sink) = ctx.progress("bundle");
        let updater = BundleUpdater::from_config(&ctx.config)?.with_events(sink);

        let install = updater.install(&descriptor, &self.native_version);
        tokio::pin!(install);
        let result = tokio::select! {
            result = &mut install => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; cancelling bundle install");
                updater.cancel();
                install.await
            }
        };
        bar.finish_and_clear();

        match result? {
            BundleInstall::Installed {
                pointer,
                commit,
                report,
            } => {
                println!("{} Installed bundle {}", "✓".green(), pointer.to_string().bold());
                println!("  Verified files: {}", report.verified);
                if !report.untracked.is_empty() {
                    println!("  {} untracked: {}", "⚠".yellow(), report.untracked.join(", "));
                }
                if let Some(previous) = commit.previous {
                    println!("  Previous: {previous}");
                }
                for evicted in &commit.evicted {
                    println!("  Evicted: {}-{}", evicted.app_version, evicted.bundle_version);
                }
            }
            BundleInstall::Joined => {
                println!("{} A bundle install is already running", "⚠".yellow());
            }
        }
        Ok(())
    }
}

/// Download a bundle archive without installing it.
#[derive(Args, Debug)]
pub struct DownloadCommand {
    /// Update-check JSON describing the release
    file: PathBuf,
}

impl DownloadCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let check = read_update_check(&self.file).await?;
        let descriptor = check.bundle_descriptor(&ctx.config.layout().staging_dir)?;
        let (bar, sink) = ctx.progress("bundle");
        let updater = BundleUpdater::from_config(&ctx.config)?.with_events(sink);

        let outcome = updater.download_bundle(&descriptor).await;
        bar.finish_and_clear();

        let target = descriptor.target_file_path.display();
        match outcome? {
            DownloadOutcome::Downloaded {
                bytes,
            } => println!("{} Downloaded {bytes} bytes to {target}", "✓".green()),
            DownloadOutcome::Cached => println!("{} {target} is already up to date", "✓".green()),
            DownloadOutcome::Joined => {
                println!("{} A bundle download is already running", "⚠".yellow());
            }
        }
        Ok(())
    }
}
