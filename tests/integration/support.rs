//! Shared helpers for building updaters and releases.

use abu_cli::config::UpdaterConfig;
use abu_cli::events::{EventSink, UpdateEvent};
use abu_cli::installer::{BundleUpdater, PackageUpdater};
use abu_cli::release::{ReleaseDescriptor, UpdateCheck};
use abu_cli::test_utils::fixtures::{BuiltBundle, BundleFixture, manifest_signature, public_key_hex};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Collects every event emitted by an updater.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<UpdateEvent>>>,
}

impl EventLog {
    pub fn sink(&self) -> Arc<dyn EventSink> {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: UpdateEvent| events.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<UpdateEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The `downloading` percentages in emission order.
    pub fn progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UpdateEvent::Downloading {
                    progress,
                } => Some(progress),
                _ => None,
            })
            .collect()
    }
}

/// Config rooted at `data_dir` that trusts the fixture signing key.
pub fn config(data_dir: &Path) -> UpdaterConfig {
    abu_cli::test_utils::init_test_logging(None);
    let mut config = UpdaterConfig::with_data_dir(data_dir);
    config.public_key = Some(public_key_hex());
    config
}

pub fn bundle_updater(config: &UpdaterConfig, log: &EventLog) -> BundleUpdater {
    BundleUpdater::from_config(config).unwrap().with_events(log.sink())
}

pub fn package_updater(config: &UpdaterConfig, log: &EventLog) -> PackageUpdater {
    PackageUpdater::from_config(config).unwrap().with_events(log.sink())
}

/// Builds `fixture` into an archive and returns it with its bytes.
pub fn build_bundle(fixture: &BundleFixture, workdir: &Path) -> (BuiltBundle, Vec<u8>) {
    let built = fixture.write_archive(&workdir.join("origin.zip")).unwrap();
    let bytes = std::fs::read(&built.path).unwrap();
    (built, bytes)
}

/// Descriptor for a signed bundle release, parsed from an update-check document.
pub fn bundle_release(
    config: &UpdaterConfig,
    url: &str,
    built: &BuiltBundle,
    app_version: &str,
    bundle_version: u32,
) -> ReleaseDescriptor {
    let check = serde_json::json!({
        "downloadUrl": url,
        "filePath": format!("{app_version}-{bundle_version}.zip"),
        "signature": manifest_signature(&built.manifest_digest),
        "latestVersion": app_version,
        "bundleVersion": bundle_version,
        "sha256": built.archive_digest,
        "fileSize": built.size,
    });
    UpdateCheck::from_json(&check.to_string())
        .unwrap()
        .bundle_descriptor(&config.layout().staging_dir)
        .unwrap()
}
