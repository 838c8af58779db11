//! Download progress, single-flight and cancellation over HTTP.

use crate::server::{ServedFile, TestServer};
use crate::support::{EventLog, bundle_updater, config};
use abu_cli::core::AbuError;
use abu_cli::events::UpdateEvent;
use abu_cli::installer::DownloadOutcome;
use abu_cli::release::ReleaseDescriptor;
use abu_cli::verification::Hasher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

const TEN_MB: usize = 10_000_000;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn descriptor(url: String, target: &Path, body: &[u8]) -> ReleaseDescriptor {
    ReleaseDescriptor {
        download_url: url,
        target_file_path: target.to_path_buf(),
        expected_digest: Hasher::digest_bytes(body),
        detached_signature: None,
        app_version: "2.0.0".to_string(),
        bundle_version: "7".to_string(),
        declared_size: body.len() as u64,
    }
}

#[tokio::test]
async fn test_progress_reports_each_percentage_once() {
    let temp = TempDir::new().unwrap();
    let body = payload(TEN_MB);
    let server = TestServer::start(vec![("bundle.zip", ServedFile::new(body.clone()))]).await.unwrap();
    let config = config(temp.path());
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let target = config.layout().staging_dir.join("2.0.0-7.zip");

    let outcome = updater.download_bundle(&descriptor(server.url("bundle.zip"), &target, &body)).await.unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            bytes: TEN_MB as u64,
        }
    );
    assert_eq!(log.progress(), (1..=100).collect::<Vec<u8>>());

    let events = log.events();
    assert_eq!(events.first(), Some(&UpdateEvent::Start));
    assert_eq!(events.last(), Some(&UpdateEvent::Complete));
    assert_eq!(events.iter().filter(|e| **e == UpdateEvent::Complete).count(), 1);
    assert_eq!(std::fs::metadata(&target).unwrap().len(), TEN_MB as u64);
}

#[tokio::test]
async fn test_cached_archive_is_not_downloaded_again() {
    let temp = TempDir::new().unwrap();
    let body = payload(4096);
    let server = TestServer::start(vec![("bundle.zip", ServedFile::new(body.clone()))]).await.unwrap();
    let config = config(temp.path());
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let target = config.layout().staging_dir.join("2.0.0-7.zip");
    let release = descriptor(server.url("bundle.zip"), &target, &body);

    updater.download_bundle(&release).await.unwrap();
    let second = updater.download_bundle(&release).await.unwrap();

    assert_eq!(second, DownloadOutcome::Cached);
    assert_eq!(server.hits("bundle.zip"), 1);
}

#[tokio::test]
async fn test_concurrent_download_joins_running_one() {
    let temp = TempDir::new().unwrap();
    let body = payload(64 * 1024);
    let gate = Arc::new(Notify::new());
    let server = TestServer::start(vec![("bundle.zip", ServedFile::new(body.clone()).gated(Arc::clone(&gate)))])
        .await
        .unwrap();
    let config = config(temp.path());
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let target = config.layout().staging_dir.join("2.0.0-7.zip");
    let release = descriptor(server.url("bundle.zip"), &target, &body);

    let (first, second) = tokio::join!(updater.download_bundle(&release), async {
        server.wait_for_hits("bundle.zip", 1).await;
        let second = updater.download_bundle(&release).await;
        gate.notify_one();
        second
    });

    assert!(matches!(first.unwrap(), DownloadOutcome::Downloaded { .. }));
    assert_eq!(second.unwrap(), DownloadOutcome::Joined);
    assert_eq!(server.hits("bundle.zip"), 1);
    assert_eq!(log.events().iter().filter(|e| **e == UpdateEvent::Start).count(), 1);
    assert!(!updater.session().is_in_flight());
}

#[tokio::test]
async fn test_cancel_leaves_partial_file() {
    let temp = TempDir::new().unwrap();
    let body = payload(256 * 1024);
    let prefix = 32 * 1024;
    let server = TestServer::start(vec![("bundle.zip", ServedFile::new(body.clone()).stalling_after(prefix))])
        .await
        .unwrap();
    let config = config(temp.path());
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let target = config.layout().staging_dir.join("2.0.0-7.zip");
    let release = descriptor(server.url("bundle.zip"), &target, &body);

    let (result, cancelled) = tokio::join!(updater.download_bundle(&release), async {
        tokio::time::timeout(Duration::from_secs(10), async {
            while std::fs::metadata(&target).map(|m| m.len()).unwrap_or(0) < prefix as u64 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        updater.cancel()
    });

    assert!(cancelled);
    assert!(matches!(result.unwrap_err(), AbuError::Cancelled));
    assert_eq!(std::fs::metadata(&target).unwrap().len(), prefix as u64);
    assert!(!updater.session().is_in_flight());
    assert!(matches!(log.events().last(), Some(UpdateEvent::Error { .. })));
    assert!(!updater.cancel());
}

#[tokio::test]
async fn test_not_found_is_http_error() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(vec![]).await.unwrap();
    let config = config(temp.path());
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let target = config.layout().staging_dir.join("2.0.0-7.zip");

    let err = updater.download_bundle(&descriptor(server.url("missing.zip"), &target, b"x")).await.unwrap_err();

    assert!(matches!(
        err,
        AbuError::HttpError {
            code: 404,
            ..
        }
    ));
    assert_eq!(log.events().first(), Some(&UpdateEvent::Start));
    assert!(matches!(log.events().last(), Some(UpdateEvent::Error { .. })));
}

#[tokio::test]
async fn test_digest_mismatch_deletes_download() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(vec![("bundle.zip", ServedFile::new(payload(2048)))]).await.unwrap();
    let config = config(temp.path());
    let updater = bundle_updater(&config, &EventLog::default());
    let target = config.layout().staging_dir.join("2.0.0-7.zip");

    let err = updater
        .download_bundle(&descriptor(server.url("bundle.zip"), &target, b"something else"))
        .await
        .unwrap_err();

    assert!(matches!(err, AbuError::VerificationFailed { .. }));
    assert!(!target.exists());
}
