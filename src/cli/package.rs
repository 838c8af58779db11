//! Native package command.

use super::common::{CommandContext, read_update_check};
use crate::installer::PackageUpdater;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

/// Download and verify a native installer package.
#[derive(Args, Debug)]
pub struct PackageCommand {
    /// Update-check JSON describing the package
    file: PathBuf,
}

impl PackageCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let check = read_update_check(&self.file).await?;
        let descriptor = check.package_descriptor(&ctx.config.layout().package_dir)?;
        let (bar, sink) = ctx.progress("package");
        let updater = PackageUpdater::from_config(&ctx.config)?.with_events(sink);

        let result = updater.install(&descriptor).await;
        bar.finish_and_clear();

        let Some(package) = result? else {
            println!("{} A package download is already running", "⚠".yellow());
            return Ok(());
        };

        println!("{} Package ready: {}", "✓".green(), package.path.display());
        println!("  sha256: {}", package.digest);
        if !package.signed {
            println!("  {} signature was not checked", "⚠".yellow());
        }
        Ok(())
    }
}
