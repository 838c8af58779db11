//! Native package downloads with signature sidecars.

use crate::server::{ServedFile, TestServer};
use crate::support::{EventLog, config, package_updater};
use abu_cli::config::UpdaterConfig;
use abu_cli::core::AbuError;
use abu_cli::events::UpdateEvent;
use abu_cli::release::{ReleaseDescriptor, UpdateCheck};
use abu_cli::test_utils::fixtures::digest_signature;
use abu_cli::verification::Hasher;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Notify;

const PACKAGE: &[u8] = b"native installer package";

fn package_release(config: &UpdaterConfig, url: &str) -> ReleaseDescriptor {
    let check = serde_json::json!({
        "downloadUrl": url,
        "filePath": "app.apk",
        "latestVersion": "5.1.0",
        "sha256": Hasher::digest_bytes(PACKAGE),
        "fileSize": PACKAGE.len(),
    });
    UpdateCheck::from_json(&check.to_string())
        .unwrap()
        .package_descriptor(&config.layout().package_dir)
        .unwrap()
}

#[tokio::test]
async fn test_package_verified_with_sidecar_signature() {
    let temp = TempDir::new().unwrap();
    let sidecar = digest_signature(&Hasher::digest_bytes(PACKAGE), "app.apk");
    let server = TestServer::start(vec![
        ("app.apk", ServedFile::new(PACKAGE.to_vec())),
        ("app.apk.SHA256SUMS.asc", ServedFile::new(sidecar.clone().into_bytes())),
    ])
    .await
    .unwrap();
    let config = config(temp.path());
    let log = EventLog::default();
    let updater = package_updater(&config, &log);
    let release = package_release(&config, &server.url("app.apk"));

    let package = updater.install(&release).await.unwrap().unwrap();

    assert!(package.signed);
    assert_eq!(std::fs::read(&package.path).unwrap(), PACKAGE);
    let stored = config.layout().package_dir.join("app.apk.SHA256SUMS.asc");
    assert_eq!(std::fs::read_to_string(stored).unwrap(), sidecar);
    assert_eq!(log.events().last(), Some(&UpdateEvent::Complete));
}

#[tokio::test]
async fn test_missing_sidecar_rejects_when_signatures_required() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(vec![("app.apk", ServedFile::new(PACKAGE.to_vec()))]).await.unwrap();
    let config = config(temp.path());
    let updater = package_updater(&config, &EventLog::default());
    let release = package_release(&config, &server.url("app.apk"));

    let err = updater.install(&release).await.unwrap_err();

    assert!(matches!(err, AbuError::VerificationFailed { .. }));
    assert_eq!(server.hits("app.apk.SHA256SUMS.asc"), 1);
}

#[tokio::test]
async fn test_second_package_download_is_rejected() {
    let temp = TempDir::new().unwrap();
    let gate = Arc::new(Notify::new());
    let sidecar = digest_signature(&Hasher::digest_bytes(PACKAGE), "app.apk");
    let server = TestServer::start(vec![
        ("app.apk", ServedFile::new(PACKAGE.to_vec()).gated(Arc::clone(&gate))),
        ("app.apk.SHA256SUMS.asc", ServedFile::new(sidecar.into_bytes())),
    ])
    .await
    .unwrap();
    let config = config(temp.path());
    let updater = package_updater(&config, &EventLog::default());
    let release = package_release(&config, &server.url("app.apk"));

    let (first, second) = tokio::join!(updater.install(&release), async {
        server.wait_for_hits("app.apk", 1).await;
        let second = updater.install(&release).await;
        gate.notify_one();
        second
    });

    assert!(first.unwrap().is_some());
    match second.unwrap_err() {
        AbuError::SingleFlightRejected {
            class,
        } => assert_eq!(class, "package"),
        other => panic!("expected SingleFlightRejected, got {other:?}"),
    }
    assert_eq!(server.hits("app.apk"), 1);
}
