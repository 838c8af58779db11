//! Digest and version comparison helpers.

use crate::verification::Hasher;
use crate::version::compare_versions_signum;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Print the SHA-256 of a file in `sha256sum` format.
#[derive(Args, Debug)]
pub struct DigestCommand {
    file: PathBuf,
}

impl DigestCommand {
    pub async fn execute(self) -> Result<()> {
        let digest = Hasher::digest(&self.file)
            .await
            .with_context(|| format!("Failed to hash {}", self.file.display()))?;
        println!("{digest}  {}", self.file.display());
        Ok(())
    }
}

/// Compare two dotted versions, printing -1, 0 or 1.
#[derive(Args, Debug)]
pub struct CompareCommand {
    a: String,
    b: String,
}

impl CompareCommand {
    pub fn execute(self) {
        println!("{}", compare_versions_signum(Some(&self.a), Some(&self.b)));
    }
}
