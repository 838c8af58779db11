//! Rollback to a fallback bundle.

use super::common::CommandContext;
use crate::installer::BundleUpdater;
use crate::release::BundlePointer;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Make a previously installed bundle current again.
#[derive(Args, Debug)]
pub struct RollbackCommand {
    /// Bundle to restore, as `<appVersion>-<bundleVersion>`
    pointer: String,
}

impl RollbackCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let pointer = BundlePointer::parse(&self.pointer)?;
        let updater = BundleUpdater::from_config(&ctx.config)?;

        let entry = updater.switch_to_fallback(&pointer).await?;
        println!(
            "{} Rolled back to {}-{}",
            "✓".green(),
            entry.app_version,
            entry.bundle_version
        );
        Ok(())
    }
}
