//! Per-artifact-class single-flight state.
//!
//! Each artifact class owns one [`DownloadSession`]. Starting a transfer flips
//! the in-flight flag and installs a fresh cancellation token; the returned
//! [`InFlightGuard`] clears both when dropped, whether the attempt succeeded,
//! failed, or was cancelled.

use crate::core::{AbuError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What a second request does while a transfer of the same class is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingleFlightPolicy {
    /// Return success immediately without a second transfer
    Join,
    /// Fail with [`AbuError::SingleFlightRejected`]
    Reject,
}

/// Single-flight flag and cancellation handle for one artifact class.
#[derive(Debug)]
pub struct DownloadSession {
    class: String,
    policy: SingleFlightPolicy,
    in_flight: AtomicBool,
    token: Mutex<Option<CancellationToken>>,
}

impl DownloadSession {
    pub fn new(class: impl Into<String>, policy: SingleFlightPolicy) -> Self {
        Self {
            class: class.into(),
            policy,
            in_flight: AtomicBool::new(false),
            token: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[must_use]
    pub fn policy(&self) -> SingleFlightPolicy {
        self.policy
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the session for one attempt.
    ///
    /// Returns `Ok(None)` when another attempt is running and the policy is
    /// [`SingleFlightPolicy::Join`].
    ///
    /// # Errors
    ///
    /// [`AbuError::SingleFlightRejected`] when another attempt is running and
    /// the policy is [`SingleFlightPolicy::Reject`].
    pub fn begin(&self) -> Result<Option<InFlightGuard<'_>>> {
        if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return match self.policy {
                SingleFlightPolicy::Join => {
                    debug!(class = %self.class, "Joining in-flight download");
                    Ok(None)
                }
                SingleFlightPolicy::Reject => Err(AbuError::SingleFlightRejected {
                    class: self.class.clone(),
                }),
            };
        }

        let token = CancellationToken::new();
        *self.lock_token() = Some(token.clone());
        debug!(class = %self.class, "Download session started");
        Ok(Some(InFlightGuard {
            session: self,
            token,
        }))
    }

    /// Cancels the running attempt, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match self.lock_token().as_ref() {
            Some(token) => {
                debug!(class = %self.class, "Cancelling download");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn lock_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.token.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Proof that the holder owns its session's single flight.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    session: &'a DownloadSession,
    token: CancellationToken,
}

impl InFlightGuard<'_> {
    /// Token cancelled by [`DownloadSession::cancel`].
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.session.lock_token() = None;
        self.session.in_flight.store(false, Ordering::Release);
        debug!(class = %self.session.class, "Download session finished");
    }
}
