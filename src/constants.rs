//! Global constants used throughout the updater.
//!
//! File and key names here form the persisted layout; changing them orphans
//! data written by earlier versions.

/// Buffer size for streaming digests and download writes (8 KiB).
pub const STREAM_BUFFER_SIZE: usize = 8 * 1024;

/// Number of previously installed bundles kept for rollback.
pub const MAX_FALLBACK_ENTRIES: usize = 3;

/// Per-bundle manifest mapping relative paths to SHA-256 digests.
pub const MANIFEST_FILE_NAME: &str = "metadata.json";

/// File names created by operating systems and archivers, never validated.
pub const OS_ARTIFACT_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Directory names created by archivers, skipped entirely during validation.
pub const OS_ARTIFACT_DIRS: &[&str] = &["__MACOSX"];

/// Default entry point checked when resolving the current bundle.
pub const DEFAULT_ENTRY_FILE: &str = "main.jsbundle.hbc";

/// Directory inside a bundle holding the embedded web assets.
pub const WEB_EMBED_DIR_NAME: &str = "web-embed";

/// Fallback stack file kept inside the install root.
pub const FALLBACK_FILE_NAME: &str = "fallbackUpdateBundleData.json";

/// Staging directory for downloaded bundle archives.
pub const STAGING_DIR_NAME: &str = "bundle-download";

/// Install root holding one directory per bundle pointer.
pub const INSTALL_DIR_NAME: &str = "bundle";

/// Directory holding signature scratch files.
pub const SCRATCH_DIR_NAME: &str = "cache";

/// Directory holding downloaded native packages.
pub const PACKAGE_DIR_NAME: &str = "package-download";

/// Key-value store backing the version ledger.
pub const LEDGER_FILE_NAME: &str = "ledger.json";

/// Name of the cross-process lock guarding ledger commits.
pub const LEDGER_LOCK_NAME: &str = "ledger";

pub const BUNDLE_SCRATCH_FILE: &str = "bundle-verification-temp";
pub const PACKAGE_SCRATCH_FILE: &str = "package-verification-temp";

/// Suffix of the detached signature published next to a native package.
pub const SIGNATURE_SIDECAR_SUFFIX: &str = ".SHA256SUMS.asc";

/// Ledger key holding the current bundle pointer.
pub const CURRENT_POINTER_KEY: &str = "currentBundleVersion";

/// Ledger key holding the native version the current bundle was installed under.
pub const NATIVE_VERSION_KEY: &str = "nativeVersion";

/// Default HTTP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default config file name under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "ABU_CONFIG";
