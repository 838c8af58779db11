//! Updater configuration.
//!
//! Settings live in a TOML file, by default `<config_dir>/abu/config.toml`,
//! overridable with `ABU_CONFIG` or the CLI's `--config`. Every field has a
//! default, so a missing file is a valid configuration.
//!
//! ```toml
//! data_dir = "/var/lib/abu"
//! signature_policy = "required"
//! public_key = "3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29"
//! entry_file = "main.jsbundle.hbc"
//! reject_untracked_files = false
//!
//! [single_flight]
//! bundle = "join"
//! package = "reject"
//!
//! [http]
//! connect_timeout_secs = 30
//! user_agent = "abu/0.1.0"
//! ```

use crate::constants::{
    CONFIG_ENV, CONFIG_FILE_NAME, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_ENTRY_FILE, INSTALL_DIR_NAME,
    LEDGER_FILE_NAME, PACKAGE_DIR_NAME, SCRATCH_DIR_NAME, STAGING_DIR_NAME,
};
use crate::core::{AbuError, Result};
use crate::download::{Downloader, SingleFlightPolicy};
use crate::installer::SignaturePolicy;
use crate::ledger::{JsonFileStore, VersionLedger};
use crate::manifest::UntrackedPolicy;
use crate::utils::fs::atomic_write;
use crate::verification::{Ed25519TrustVerifier, TrustVerifier};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Top-level updater settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Root of all persisted state
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub signature_policy: SignaturePolicy,

    /// Ed25519 verifying key, hex or base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// File inside a bundle that the host launches
    #[serde(default = "default_entry_file")]
    pub entry_file: String,

    /// Fail manifest validation on files the manifest does not list
    #[serde(default)]
    pub reject_untracked_files: bool,

    #[serde(default)]
    pub single_flight: SingleFlightConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

/// Single-flight policy per artifact class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleFlightConfig {
    #[serde(default = "default_bundle_policy")]
    pub bundle: SingleFlightPolicy,
    #[serde(default = "default_package_policy")]
    pub package: SingleFlightPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("abu"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".abu")))
        .unwrap_or_else(|| PathBuf::from(".abu"))
}

fn default_entry_file() -> String {
    DEFAULT_ENTRY_FILE.to_string()
}

const fn default_bundle_policy() -> SingleFlightPolicy {
    SingleFlightPolicy::Join
}

const fn default_package_policy() -> SingleFlightPolicy {
    SingleFlightPolicy::Reject
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    concat!("abu/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            signature_policy: SignaturePolicy::default(),
            public_key: None,
            entry_file: default_entry_file(),
            reject_untracked_files: false,
            single_flight: SingleFlightConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for SingleFlightConfig {
    fn default() -> Self {
        Self {
            bundle: default_bundle_policy(),
            package: default_package_policy(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl UpdaterConfig {
    /// Config with defaults and persisted state under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Loads from `$ABU_CONFIG` or the default path; a missing file yields defaults.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Loads from `path` when given, otherwise like [`UpdaterConfig::load`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::resolve_path(std::env::var_os(CONFIG_ENV).map(PathBuf::from))?,
        };
        if tokio::fs::try_exists(&path).await? {
            Self::load_from(&path).await
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        toml::from_str(&content).map_err(|e| AbuError::ConfigError {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Writes the config as TOML, replacing any existing file atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| AbuError::ConfigError {
            message: format!("failed to serialize config: {e}"),
        })?;
        atomic_write(path, content.as_bytes())
    }

    /// `<config_dir>/abu/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| AbuError::ConfigError {
            message: "unable to determine the user config directory".to_string(),
        })?;
        Ok(dir.join("abu").join(CONFIG_FILE_NAME))
    }

    fn resolve_path(from_env: Option<PathBuf>) -> Result<PathBuf> {
        match from_env {
            Some(path) => Ok(path),
            None => Self::default_path(),
        }
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout::new(&self.data_dir)
    }

    #[must_use]
    pub fn untracked_policy(&self) -> UntrackedPolicy {
        if self.reject_untracked_files {
            UntrackedPolicy::Reject
        } else {
            UntrackedPolicy::Ignore
        }
    }

    /// Trust capability built from `public_key`, if one is configured.
    pub fn trust_verifier(&self) -> Result<Option<Arc<dyn TrustVerifier>>> {
        match self.public_key.as_deref() {
            Some(key) => Ok(Some(Arc::new(Ed25519TrustVerifier::from_encoded(key)?))),
            None => Ok(None),
        }
    }

    pub fn downloader(&self) -> Result<Downloader> {
        Downloader::new(Duration::from_secs(self.http.connect_timeout_secs), &self.http.user_agent)
    }

    /// Ledger backed by `ledger.json` under the data directory.
    pub fn open_ledger(&self) -> Result<VersionLedger> {
        let layout = self.layout();
        let store = JsonFileStore::open(&layout.ledger_file)?;
        Ok(VersionLedger::new(Arc::new(store), layout.install_root, layout.data_dir))
    }
}

/// On-disk locations derived from the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub data_dir: PathBuf,
    /// Downloaded bundle archives
    pub staging_dir: PathBuf,
    /// One directory per installed bundle plus the fallback list
    pub install_root: PathBuf,
    /// Signature verification scratch files
    pub scratch_dir: PathBuf,
    /// Downloaded native packages
    pub package_dir: PathBuf,
    pub ledger_file: PathBuf,
}

impl Layout {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            staging_dir: data_dir.join(STAGING_DIR_NAME),
            install_root: data_dir.join(INSTALL_DIR_NAME),
            scratch_dir: data_dir.join(SCRATCH_DIR_NAME),
            package_dir: data_dir.join(PACKAGE_DIR_NAME),
            ledger_file: data_dir.join(LEDGER_FILE_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: UpdaterConfig = toml::from_str("").unwrap();

        assert_eq!(config.signature_policy, SignaturePolicy::Required);
        assert_eq!(config.entry_file, DEFAULT_ENTRY_FILE);
        assert_eq!(config.single_flight.bundle, SingleFlightPolicy::Join);
        assert_eq!(config.single_flight.package, SingleFlightPolicy::Reject);
        assert_eq!(config.http.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert!(!config.reject_untracked_files);
    }

    #[test]
    fn test_partial_tables() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            data_dir = "/srv/abu"
            signature_policy = "optional"
            reject_untracked_files = true

            [single_flight]
            package = "join"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/abu"));
        assert_eq!(config.signature_policy, SignaturePolicy::Optional);
        assert_eq!(config.untracked_policy(), UntrackedPolicy::Reject);
        assert_eq!(config.single_flight.bundle, SingleFlightPolicy::Join);
        assert_eq!(config.single_flight.package, SingleFlightPolicy::Join);
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let mut config = UpdaterConfig::with_data_dir(temp.path().join("data"));
        config.public_key = Some("00".repeat(32));
        config.http.user_agent = "test-agent".to_string();

        config.save_to(&path).unwrap();
        let loaded = UpdaterConfig::load_from(&path).await.unwrap();

        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();

        let config =
            UpdaterConfig::load_with_optional(Some(temp.path().join("absent.toml"))).await.unwrap();

        assert_eq!(config.entry_file, DEFAULT_ENTRY_FILE);
    }

    #[tokio::test]
    async fn test_invalid_toml_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "signature_policy = [").unwrap();

        let err = UpdaterConfig::load_from(&path).await.unwrap_err();

        assert!(matches!(err, AbuError::ConfigError { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_selects_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("env.toml");
        std::fs::write(&path, "entry_file = \"index.bundle\"\n").unwrap();

        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var(CONFIG_ENV, &path) };
        let loaded = UpdaterConfig::load().await;
        unsafe { std::env::remove_var(CONFIG_ENV) };

        assert_eq!(loaded.unwrap().entry_file, "index.bundle");
    }

    #[test]
    fn test_layout_paths() {
        let layout = UpdaterConfig::with_data_dir("/data").layout();

        assert_eq!(layout.staging_dir, PathBuf::from("/data/bundle-download"));
        assert_eq!(layout.install_root, PathBuf::from("/data/bundle"));
        assert_eq!(layout.scratch_dir, PathBuf::from("/data/cache"));
        assert_eq!(layout.package_dir, PathBuf::from("/data/package-download"));
        assert_eq!(layout.ledger_file, PathBuf::from("/data/ledger.json"));
    }

    #[test]
    fn test_bad_public_key_is_config_error() {
        let mut config = UpdaterConfig::with_data_dir("/data");
        config.public_key = Some("not-a-key".to_string());

        assert!(matches!(config.trust_verifier(), Err(AbuError::ConfigError { .. })));
    }
}
