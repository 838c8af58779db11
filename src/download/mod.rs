//! Streaming HTTP downloads with coalesced progress and cooperative cancellation.
//!
//! [`Downloader::fetch`] owns the transfer mechanics only. Single-flight
//! bookkeeping lives in [`session`]; what happens to the file afterwards is the
//! installer's business.
//!
//! Progress is reported as integer percentages of
//! `max(declared_size, content_length)`. Every integer between the last
//! reported value and the current one is reported once, so consumers see a
//! gap-free, non-decreasing sequence ending at 100 for a complete transfer.
//! When neither size is known nothing is reported.

pub mod session;

pub use session::{DownloadSession, InFlightGuard, SingleFlightPolicy};

use crate::constants::STREAM_BUFFER_SIZE;
use crate::core::{AbuError, Result};
use crate::utils::fs::{ensure_parent_dir, remove_file_if_exists};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// HTTP client wrapper used for every artifact class.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Builds a client with the given connect timeout and user agent.
    pub fn new(connect_timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
        }
    }

    /// Streams `url` into `target`, returning the number of bytes written.
    ///
    /// Any existing file at `target` is deleted first. On cancellation the
    /// partial file stays on disk.
    ///
    /// # Errors
    ///
    /// - [`AbuError::HttpError`] for a non-2xx response
    /// - [`AbuError::NetworkError`] if the connection fails mid-transfer
    /// - [`AbuError::Cancelled`] if `cancel` fires before the body is complete
    /// - [`AbuError::IoError`] if the file cannot be written
    pub async fn fetch(
        &self,
        url: &str,
        target: &Path,
        declared_size: u64,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<u64> {
        remove_file_if_exists(target)?;
        ensure_parent_dir(target)?;

        info!("Downloading {url} to {}", target.display());

        let mut response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AbuError::Cancelled),
            response = self.client.get(url).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AbuError::HttpError {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = declared_size.max(response.content_length().unwrap_or(0));
        let mut tracker = PercentTracker::new(total);
        let mut file = File::create(target).await?;
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    abandon(&mut file, target, written).await;
                    return Err(AbuError::Cancelled);
                }
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else {
                break;
            };

            for slice in chunk.chunks(STREAM_BUFFER_SIZE) {
                if cancel.is_cancelled() {
                    abandon(&mut file, target, written).await;
                    return Err(AbuError::Cancelled);
                }
                file.write_all(slice).await?;
                written += slice.len() as u64;
                tracker.advance(written, on_progress);
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        debug!("Downloaded {written} bytes from {url}");
        Ok(written)
    }

    /// Fetches a small text resource such as a signature sidecar.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AbuError::HttpError {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

async fn abandon(file: &mut File, target: &Path, written: u64) {
    info!("Download cancelled after {written} bytes; leaving {}", target.display());
    if let Err(e) = file.flush().await {
        warn!("Failed to flush partial download {}: {}", target.display(), e);
    }
}

/// Turns byte counts into a gap-free sequence of integer percentages.
#[derive(Debug, Clone)]
pub(crate) struct PercentTracker {
    total: u64,
    reported: u8,
}

impl PercentTracker {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total,
            reported: 0,
        }
    }

    /// Reports every percentage between the last reported one and `done`.
    pub(crate) fn advance(&mut self, done: u64, emit: &mut (dyn FnMut(u8) + Send)) {
        if self.total == 0 {
            return;
        }
        let percent = (u128::from(done.min(self.total)) * 100 / u128::from(self.total)) as u8;
        while self.reported < percent {
            self.reported += 1;
            emit(self.reported);
        }
    }
}
