//! Shared state and helpers for CLI commands

use crate::config::UpdaterConfig;
use crate::events::{EventSink, UpdateEvent};
use crate::release::UpdateCheck;
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Settings every command runs with.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: UpdaterConfig,
    /// Suppress progress bars
    pub no_progress: bool,
}

impl CommandContext {
    pub fn new(config: UpdaterConfig, no_progress: bool) -> Self {
        Self {
            config,
            no_progress,
        }
    }

    /// Builds a progress bar and an event sink that drives it.
    pub fn progress(&self, prefix: &str) -> (ProgressBar, Arc<dyn EventSink>) {
        let bar = ProgressBar::percent(prefix, self.no_progress);
        let observer = bar.clone();
        let sink: Arc<dyn EventSink> = Arc::new(move |event: UpdateEvent| observer.observe(&event));
        (bar, sink)
    }
}

/// Reads an update-check response from disk.
pub async fn read_update_check(path: &Path) -> Result<UpdateCheck> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read release file {}", path.display()))?;
    UpdateCheck::from_json(&content)
        .with_context(|| format!("Invalid release file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_update_check() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("release.json");
        std::fs::write(
            &path,
            r#"{"downloadUrl":"http://localhost/b.zip","filePath":"b.zip","latestVersion":"1.0.0","bundleVersion":3,"sha256":"00"}"#,
        )
        .unwrap();

        assert!(read_update_check(&path).await.is_ok());
        assert!(read_update_check(&temp.path().join("missing.json")).await.is_err());
    }

    #[test]
    fn test_hidden_progress() {
        let ctx = CommandContext::new(UpdaterConfig::with_data_dir("/tmp/abu"), true);
        let (bar, sink) = ctx.progress("bundle");
        sink.emit(UpdateEvent::Start);
        assert!(bar.is_hidden());
    }
}
