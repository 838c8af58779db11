//! Download and state cleanup.

use super::common::CommandContext;
use crate::installer::BundleUpdater;
use crate::utils::fs::remove_dir_if_exists;
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Remove staged downloads, or all updater state with `--all`.
#[derive(Args, Debug)]
pub struct ClearCommand {
    /// Also remove installed bundles and the version ledger
    #[arg(long)]
    all: bool,
}

impl ClearCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let updater = BundleUpdater::from_config(&ctx.config)?;

        if self.all {
            updater.clear_all().await?;
        } else {
            updater.clear_downloads()?;
        }
        remove_dir_if_exists(&ctx.config.layout().package_dir)?;

        let what = if self.all {
            "downloads, bundles and ledger"
        } else {
            "downloads"
        };
        println!("{} Cleared {what}", "✓".green());
        Ok(())
    }
}
