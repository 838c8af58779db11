//! Install state machine.
//!
//! ```text
//! Idle -> Downloading -> Verifying -> Extracting -> ValidatingManifest -> Committing -> Installed
//!   \________________________/ \____________________/                     /
//!    cached artifact             current bundle re-validated  package ----
//! ```
//!
//! `Failed` is reachable from every non-terminal state. `Installed` and
//! `Failed` are terminal.

use crate::core::{AbuError, Result};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallState {
    Idle,
    Downloading,
    Verifying,
    Extracting,
    ValidatingManifest,
    Committing,
    Installed,
    Failed,
}

impl InstallState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Failed)
    }

    /// Whether the pipeline may move from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use InstallState::{
            Committing, Downloading, Extracting, Failed, Idle, Installed, ValidatingManifest, Verifying,
        };
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Idle, Downloading | Verifying)
                | (Downloading, Verifying)
                | (Verifying, Extracting | ValidatingManifest | Committing)
                | (Extracting, ValidatingManifest)
                | (ValidatingManifest, Committing)
                | (Committing, Installed)
        )
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::ValidatingManifest => "validating-manifest",
            Self::Committing => "committing",
            Self::Installed => "installed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks one attempt's walk through [`InstallState`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    label: String,
    history: Vec<InstallState>,
}

impl Pipeline {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            history: vec![InstallState::Idle],
        }
    }

    #[must_use]
    pub fn state(&self) -> InstallState {
        self.history.last().copied().unwrap_or(InstallState::Idle)
    }

    /// States visited so far, starting with `Idle`.
    #[must_use]
    pub fn history(&self) -> &[InstallState] {
        &self.history
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// [`AbuError::ParamsInvalid`] if the transition is not allowed.
    pub fn advance(&mut self, next: InstallState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(AbuError::params(format!(
                "{}: invalid install transition {current} -> {next}",
                self.label
            )));
        }
        debug!(pipeline = %self.label, "{current} -> {next}");
        self.history.push(next);
        Ok(())
    }

    /// Records the failure of the current step. Terminal pipelines are left alone.
    pub fn fail(&mut self, error: &AbuError) {
        let current = self.state();
        if current.is_terminal() {
            return;
        }
        warn!(pipeline = %self.label, "{current} failed: {error}");
        self.history.push(InstallState::Failed);
    }

    /// Marks the pipeline failed if `result` is an error, passing it through.
    pub fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }
}
