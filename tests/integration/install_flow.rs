//! Full bundle installs over HTTP.

use crate::server::{ServedFile, TestServer};
use crate::support::{EventLog, build_bundle, bundle_release, bundle_updater, config};
use abu_cli::core::AbuError;
use abu_cli::events::UpdateEvent;
use abu_cli::installer::{BundleEntry, BundleInstall};
use abu_cli::release::BundlePointer;
use abu_cli::test_utils::fixtures::BundleFixture;
use tempfile::TempDir;

#[tokio::test]
async fn test_untracked_file_is_installed() {
    let temp = TempDir::new().unwrap();
    let fixture = BundleFixture::standard().with_untracked("notes.txt", b"not in the manifest");
    let (built, bytes) = build_bundle(&fixture, temp.path());
    let server = TestServer::start(vec![("b.zip", ServedFile::new(bytes))]).await.unwrap();
    let config = config(&temp.path().join("data"));
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let release = bundle_release(&config, &server.url("b.zip"), &built, "1.0.0", 36);

    let install = updater.install(&release, "5.0.0").await.unwrap();

    let BundleInstall::Installed {
        pointer,
        report,
        ..
    } = install
    else {
        panic!("expected an install, got {install:?}");
    };
    assert_eq!(pointer.to_string(), "1.0.0-36");
    assert_eq!(report.untracked, vec!["notes.txt".to_string()]);
    assert_eq!(log.events().last(), Some(&UpdateEvent::Complete));

    let entry = updater.current_bundle_entry("5.0.0").await.unwrap();
    assert!(matches!(entry, BundleEntry::Ready { .. }));
}

#[tokio::test]
async fn test_missing_declared_file_fails_validation() {
    let temp = TempDir::new().unwrap();
    let fixture = BundleFixture::standard().with_declared_only("assets/fonts/body.ttf", b"font");
    let (built, bytes) = build_bundle(&fixture, temp.path());
    let server = TestServer::start(vec![("b.zip", ServedFile::new(bytes))]).await.unwrap();
    let config = config(&temp.path().join("data"));
    let log = EventLog::default();
    let updater = bundle_updater(&config, &log);
    let release = bundle_release(&config, &server.url("b.zip"), &built, "1.0.0", 36);

    let err = updater.install(&release, "5.0.0").await.unwrap_err();

    match err {
        AbuError::ManifestValidationFailed {
            path,
            ..
        } => assert_eq!(path, "assets/fonts/body.ttf"),
        other => panic!("expected ManifestValidationFailed, got {other:?}"),
    }
    assert_eq!(updater.ledger().current_pointer().unwrap(), None);
    assert!(matches!(log.events().last(), Some(UpdateEvent::Error { .. })));
}

#[tokio::test]
async fn test_rollback_after_second_install() {
    let temp = TempDir::new().unwrap();
    let first = build_bundle(&BundleFixture::standard(), temp.path());
    let second = build_bundle(&BundleFixture::new().with_file("main.jsbundle.hbc", b"hermes bytecode v2"), temp.path());
    let server = TestServer::start(vec![("v1.zip", ServedFile::new(first.1)), ("v2.zip", ServedFile::new(second.1))])
        .await
        .unwrap();
    let config = config(&temp.path().join("data"));
    let updater = bundle_updater(&config, &EventLog::default());

    let v1 = bundle_release(&config, &server.url("v1.zip"), &first.0, "1.0.0", 36);
    let v2 = bundle_release(&config, &server.url("v2.zip"), &second.0, "1.0.0", 37);
    updater.install(&v1, "5.0.0").await.unwrap();
    updater.install(&v2, "5.0.0").await.unwrap();

    let fallbacks = updater.fallbacks().unwrap();
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0].bundle_version, "36");
    assert!(fallbacks[0].signature.is_some());

    let previous = BundlePointer::parse("1.0.0-36").unwrap();
    updater.switch_to_fallback(&previous).await.unwrap();

    let BundleEntry::Ready {
        pointer,
        path,
    } = updater.current_bundle_entry("5.0.0").await.unwrap()
    else {
        panic!("rolled back bundle should be launchable");
    };
    assert_eq!(pointer, previous);
    assert_eq!(std::fs::read(path).unwrap(), b"hermes bytecode v1");
}

#[tokio::test]
async fn test_native_upgrade_invalidates_bundle() {
    let temp = TempDir::new().unwrap();
    let (built, bytes) = build_bundle(&BundleFixture::standard(), temp.path());
    let server = TestServer::start(vec![("b.zip", ServedFile::new(bytes))]).await.unwrap();
    let config = config(&temp.path().join("data"));
    let updater = bundle_updater(&config, &EventLog::default());
    let release = bundle_release(&config, &server.url("b.zip"), &built, "1.0.0", 36);
    updater.install(&release, "1.0").await.unwrap();

    let entry = updater.current_bundle_entry("1.1").await.unwrap();

    assert_eq!(entry, BundleEntry::NativeChanged);
    assert_eq!(updater.ledger().current_pointer().unwrap(), None);
    assert_eq!(updater.current_bundle_entry("1.1").await.unwrap(), BundleEntry::NoBundle);
}

#[tokio::test]
async fn test_state_survives_reopening_ledger() {
    let temp = TempDir::new().unwrap();
    let (built, bytes) = build_bundle(&BundleFixture::standard(), temp.path());
    let server = TestServer::start(vec![("b.zip", ServedFile::new(bytes))]).await.unwrap();
    let config = config(&temp.path().join("data"));
    let release = bundle_release(&config, &server.url("b.zip"), &built, "1.0.0", 36);
    bundle_updater(&config, &EventLog::default()).install(&release, "5.0.0").await.unwrap();

    let reopened = bundle_updater(&config, &EventLog::default());

    assert_eq!(reopened.ledger().current_pointer().unwrap(), Some(BundlePointer::parse("1.0.0-36").unwrap()));
    assert_eq!(reopened.ledger().native_version().unwrap().as_deref(), Some("5.0.0"));
    assert!(matches!(reopened.current_bundle_entry("5.0.0").await.unwrap(), BundleEntry::Ready { .. }));
}
