//! Version ledger: which bundle is current, under which native build, and
//! what can be rolled back to.
//!
//! # Persisted state
//!
//! - key-value store: `currentBundleVersion`, `nativeVersion`, and one
//!   signature entry per known pointer (keyed by the pointer itself)
//! - `<install_root>/fallbackUpdateBundleData.json`: the fallback stack
//! - `<install_root>/<pointer>/`: one directory per installed bundle
//!
//! # Commit ordering
//!
//! [`VersionLedger::commit`] writes the fallback list first and then applies
//! every store update in one batch with the current pointer last. A reader
//! therefore never sees the new pointer together with the old fallback list.
//! Directories of evicted entries are deleted only after the batch landed.

pub mod fallback;
pub mod lock;
pub mod store;

pub use fallback::{FallbackEntry, push_bounded, read_fallbacks, take_entry, write_fallbacks};
pub use lock::LedgerLock;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

use crate::constants::{
    CURRENT_POINTER_KEY, FALLBACK_FILE_NAME, LEDGER_LOCK_NAME, NATIVE_VERSION_KEY,
};
use crate::core::{AbuError, Result};
use crate::release::BundlePointer;
use crate::utils::fs::remove_dir_if_exists;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`VersionLedger::invalidate_if_native_mismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCheck {
    /// The current bundle was installed under the running native version
    Valid,
    /// The native version changed; the current pointer was cleared
    Invalidated,
    /// No bundle is current
    NoBundle,
}

/// What a commit changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Pointer that was current before the commit
    pub previous: Option<BundlePointer>,
    /// Entries pushed out of the fallback stack
    pub evicted: Vec<FallbackEntry>,
}

/// Persisted bookkeeping of installed bundles.
#[derive(Clone)]
pub struct VersionLedger {
    store: Arc<dyn KeyValueStore>,
    install_root: PathBuf,
    lock_dir: PathBuf,
}

impl VersionLedger {
    /// `install_root` holds bundle directories and the fallback file; the
    /// commit lock lives under `lock_dir`.
    pub fn new(store: Arc<dyn KeyValueStore>, install_root: impl Into<PathBuf>, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            install_root: install_root.into(),
            lock_dir: lock_dir.into(),
        }
    }

    #[must_use]
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Directory a bundle is installed into.
    #[must_use]
    pub fn bundle_dir(&self, pointer: &BundlePointer) -> PathBuf {
        self.install_root.join(pointer.to_string())
    }

    #[must_use]
    pub fn fallback_file(&self) -> PathBuf {
        self.install_root.join(FALLBACK_FILE_NAME)
    }

    /// The current pointer, if one is set and parses.
    pub fn current_pointer(&self) -> Result<Option<BundlePointer>> {
        let Some(raw) = self.store.get(CURRENT_POINTER_KEY)? else {
            return Ok(None);
        };
        match BundlePointer::parse(&raw) {
            Ok(pointer) => Ok(Some(pointer)),
            Err(e) => {
                warn!("Ignoring unparsable current pointer '{raw}': {e}");
                Ok(None)
            }
        }
    }

    pub fn native_version(&self) -> Result<Option<String>> {
        self.store.get(NATIVE_VERSION_KEY)
    }

    pub fn signature_for(&self, pointer: &BundlePointer) -> Result<Option<String>> {
        self.store.get(&pointer.to_string())
    }

    /// Makes `pointer` current and records its signature.
    pub fn set_current(&self, pointer: &BundlePointer, signature: Option<&str>) -> Result<()> {
        let key = pointer.to_string();
        self.store.apply(&[(key.as_str(), signature), (CURRENT_POINTER_KEY, Some(key.as_str()))])
    }

    /// Clears the current pointer and its signature. Directories stay on disk.
    pub fn clear_current(&self) -> Result<()> {
        match self.current_pointer()? {
            Some(pointer) => {
                let key = pointer.to_string();
                self.store.apply(&[(CURRENT_POINTER_KEY, None), (key.as_str(), None)])
            }
            None => self.store.remove(CURRENT_POINTER_KEY),
        }
    }

    /// Clears the current bundle when it was installed under another native build.
    ///
    /// A missing stored native version counts as a mismatch.
    pub fn invalidate_if_native_mismatch(&self, running: &str) -> Result<NativeCheck> {
        if self.current_pointer()?.is_none() {
            return Ok(NativeCheck::NoBundle);
        }

        let stored = self.native_version()?;
        if stored.as_deref() == Some(running) {
            return Ok(NativeCheck::Valid);
        }

        info!(
            "Native version changed ({} -> {running}); invalidating current bundle",
            stored.as_deref().unwrap_or("<none>")
        );
        self.clear_current()?;
        Ok(NativeCheck::Invalidated)
    }

    pub fn read_fallbacks(&self) -> Result<Vec<FallbackEntry>> {
        read_fallbacks(&self.fallback_file())
    }

    pub fn write_fallbacks(&self, entries: &[FallbackEntry]) -> Result<()> {
        write_fallbacks(&self.fallback_file(), entries)
    }

    /// Appends `entry` to the fallback stack, deleting what falls off the end.
    ///
    /// Returns the evicted entries.
    pub fn push_fallback(&self, entry: FallbackEntry) -> Result<Vec<FallbackEntry>> {
        let mut entries = self.read_fallbacks()?;
        let evicted = push_bounded(&mut entries, entry);
        self.write_fallbacks(&entries)?;

        let keys: Vec<String> = evicted.iter().map(entry_key).collect();
        let updates: Vec<(&str, Option<&str>)> = keys.iter().map(|k| (k.as_str(), None)).collect();
        self.store.apply(&updates)?;
        self.delete_bundle_dirs(&evicted, None)?;
        Ok(evicted)
    }

    /// Installs `pointer` as the current bundle in one logical step.
    ///
    /// The previous current bundle (if different) moves onto the fallback
    /// stack with its signature; the stack is trimmed to its bound and the
    /// evicted bundles are removed from disk and from the store.
    pub async fn commit(
        &self,
        pointer: &BundlePointer,
        signature: Option<&str>,
        native_version: &str,
    ) -> Result<CommitOutcome> {
        let _lock = LedgerLock::acquire(&self.lock_dir, LEDGER_LOCK_NAME).await?;

        let previous = self.current_pointer()?;
        let mut entries = self.read_fallbacks()?;
        take_entry(&mut entries, pointer);

        let mut evicted = Vec::new();
        if let Some(prev) = previous.as_ref().filter(|prev| *prev != pointer) {
            let prev_signature = self.signature_for(prev)?;
            evicted = push_bounded(&mut entries, FallbackEntry::new(prev, prev_signature));
        }

        self.write_fallbacks(&entries)?;

        let key = pointer.to_string();
        let evicted_keys: Vec<String> = evicted.iter().map(entry_key).collect();
        let mut updates: Vec<(&str, Option<&str>)> =
            evicted_keys.iter().map(|k| (k.as_str(), None)).collect();
        updates.push((key.as_str(), signature));
        updates.push((NATIVE_VERSION_KEY, Some(native_version)));
        updates.push((CURRENT_POINTER_KEY, Some(key.as_str())));
        self.store.apply(&updates)?;

        self.delete_bundle_dirs(&evicted, Some(pointer))?;

        info!(
            "Committed bundle {pointer} (previous: {}, evicted: {})",
            previous.as_ref().map_or_else(|| "none".to_string(), ToString::to_string),
            evicted.len()
        );
        Ok(CommitOutcome {
            previous,
            evicted,
        })
    }

    /// Rolls back to a bundle from the fallback stack.
    ///
    /// The entry leaves the stack and becomes current with its recorded
    /// signature. The abandoned bundle's directory and signature are removed.
    ///
    /// # Errors
    ///
    /// [`AbuError::ParamsInvalid`] if `pointer` is not on the stack or its
    /// directory is gone.
    pub async fn switch_to_fallback(&self, pointer: &BundlePointer) -> Result<FallbackEntry> {
        let _lock = LedgerLock::acquire(&self.lock_dir, LEDGER_LOCK_NAME).await?;

        let mut entries = self.read_fallbacks()?;
        let entry = take_entry(&mut entries, pointer)
            .ok_or_else(|| AbuError::params(format!("{pointer} is not in the fallback list")))?;
        if !self.bundle_dir(pointer).is_dir() {
            return Err(AbuError::params(format!("bundle directory for {pointer} no longer exists")));
        }

        let abandoned = self.current_pointer()?.filter(|current| current != pointer);

        self.write_fallbacks(&entries)?;
        let key = pointer.to_string();
        let abandoned_key = abandoned.as_ref().map(ToString::to_string);
        let mut updates: Vec<(&str, Option<&str>)> = Vec::new();
        if let Some(abandoned_key) = abandoned_key.as_deref() {
            updates.push((abandoned_key, None));
        }
        updates.push((key.as_str(), entry.signature.as_deref()));
        updates.push((CURRENT_POINTER_KEY, Some(key.as_str())));
        self.store.apply(&updates)?;

        if let Some(abandoned) = abandoned {
            debug!("Removing abandoned bundle {abandoned}");
            remove_dir_if_exists(&self.bundle_dir(&abandoned))?;
        }

        info!("Rolled back to bundle {pointer}");
        Ok(entry)
    }

    /// Forgets every bundle: store keys, fallback list and install root.
    pub async fn clear(&self) -> Result<()> {
        let _lock = LedgerLock::acquire(&self.lock_dir, LEDGER_LOCK_NAME).await?;
        self.store.clear()?;
        remove_dir_if_exists(&self.install_root)?;
        info!("Cleared all bundle data in {}", self.install_root.display());
        Ok(())
    }

    fn delete_bundle_dirs(&self, entries: &[FallbackEntry], keep: Option<&BundlePointer>) -> Result<()> {
        for entry in entries {
            match entry.pointer() {
                Ok(pointer) if Some(&pointer) != keep => {
                    debug!("Deleting evicted bundle {pointer}");
                    remove_dir_if_exists(&self.bundle_dir(&pointer))?;
                }
                Ok(_) => {}
                Err(e) => warn!("Not deleting directory of invalid fallback entry: {e}"),
            }
        }
        Ok(())
    }
}

fn entry_key(entry: &FallbackEntry) -> String {
    format!("{}-{}", entry.app_version, entry.bundle_version)
}
