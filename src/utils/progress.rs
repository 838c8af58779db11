//! Terminal progress rendering for the CLI.
//!
//! Download progress arrives as integer percentages through
//! [`crate::events::UpdateEvent`]; this module maps those onto an `indicatif`
//! bar. Rendering is disabled when `ABU_NO_PROGRESS` is set or when the CLI was
//! started with `--no-progress`.

use crate::events::UpdateEvent;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Environment variable that disables all progress bars.
pub const NO_PROGRESS_ENV: &str = "ABU_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A percentage bar that renders update events.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a 0..=100 bar labelled with `prefix`.
    ///
    /// The bar is hidden when `hidden` is `true` or progress output is disabled
    /// through the environment.
    pub fn percent(prefix: impl Into<String>, hidden: bool) -> Self {
        let bar = if hidden || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(100);
            bar.set_style(percent_style());
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        };
        bar.set_prefix(prefix.into());
        Self {
            inner: bar,
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Applies one event to the bar.
    pub fn observe(&self, event: &UpdateEvent) {
        match event {
            UpdateEvent::Start => self.inner.set_message("starting"),
            UpdateEvent::Downloading {
                progress,
            } => {
                self.inner.set_message("downloading");
                self.inner.set_position(u64::from(*progress));
            }
            UpdateEvent::Complete => {
                self.inner.set_position(100);
                self.inner.finish_with_message("done");
            }
            UpdateEvent::Error {
                message,
            } => self.inner.abandon_with_message(message.clone()),
        }
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }
}

fn percent_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}
