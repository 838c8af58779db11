//! Status and fallback listing.

use super::common::CommandContext;
use crate::installer::{BundleEntry, BundleUpdater};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Show the bundle the host would launch.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Native version of the running host
    #[arg(long)]
    native_version: String,
}

impl StatusCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let updater = BundleUpdater::from_config(&ctx.config)?;

        match updater.current_bundle_entry(&self.native_version).await? {
            BundleEntry::Ready {
                pointer,
                path,
            } => {
                println!("{} Current bundle: {}", "✓".green(), pointer.to_string().bold());
                println!("  Entry: {}", path.display());
                if let Some(web_embed) = updater.web_embed_path()? {
                    println!("  Web embed: {}", web_embed.display());
                }
            }
            BundleEntry::NoBundle => println!("No bundle installed; the host runs its built-in bundle"),
            BundleEntry::NativeChanged => {
                println!(
                    "{} Native version changed to {}; installed bundle was invalidated",
                    "⚠".yellow(),
                    self.native_version
                );
            }
            BundleEntry::Rejected {
                pointer,
                reason,
            } => {
                println!("{} Bundle {} failed validation: {reason}", "✗".red(), pointer);
            }
        }
        Ok(())
    }
}

/// List bundles available for rollback, oldest first.
#[derive(Args, Debug)]
pub struct FallbacksCommand {
    /// Print the list as JSON
    #[arg(long)]
    json: bool,
}

impl FallbacksCommand {
    pub fn execute(self, ctx: &CommandContext) -> Result<()> {
        let ledger = ctx.config.open_ledger()?;
        let entries = ledger.read_fallbacks()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        if entries.is_empty() {
            println!("No fallback bundles");
            return Ok(());
        }
        for entry in &entries {
            let signed = if entry.signature.is_some() {
                "signed"
            } else {
                "unsigned"
            };
            println!("  {}-{} ({signed})", entry.app_version, entry.bundle_version);
        }
        Ok(())
    }
}
