//! The bounded fallback stack.
//!
//! Previously installed bundles are remembered oldest first in a JSON array so
//! a broken update can be abandoned without re-downloading. The list is always
//! read and written as a whole.

use crate::constants::MAX_FALLBACK_ENTRIES;
use crate::core::Result;
use crate::release::BundlePointer;
use crate::utils::fs::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// One previously installed bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackEntry {
    pub app_version: String,
    pub bundle_version: String,
    /// Signature the bundle was installed with, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl FallbackEntry {
    pub fn new(pointer: &BundlePointer, signature: Option<String>) -> Self {
        Self {
            app_version: pointer.app_version().to_string(),
            bundle_version: pointer.bundle_version().to_string(),
            signature,
        }
    }

    /// Validated pointer of this entry.
    pub fn pointer(&self) -> Result<BundlePointer> {
        BundlePointer::new(self.app_version.clone(), self.bundle_version.clone())
    }

    fn is(&self, pointer: &BundlePointer) -> bool {
        self.app_version == pointer.app_version() && self.bundle_version == pointer.bundle_version()
    }
}

/// Reads the stack from `path`. A missing file is an empty stack.
///
/// An unparsable file is logged and treated as empty so a damaged history can
/// never block new installs.
pub fn read_fallbacks(path: &Path) -> Result<Vec<FallbackEntry>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice(&bytes) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            warn!("Ignoring unreadable fallback list {}: {}", path.display(), e);
            Ok(Vec::new())
        }
    }
}

/// Replaces the stack at `path` atomically.
pub fn write_fallbacks(path: &Path, entries: &[FallbackEntry]) -> Result<()> {
    atomic_write_json(path, entries)
}

/// Appends `entry`, dropping any older record of the same pointer, and returns
/// the entries evicted to keep the stack at [`MAX_FALLBACK_ENTRIES`].
pub fn push_bounded(entries: &mut Vec<FallbackEntry>, entry: FallbackEntry) -> Vec<FallbackEntry> {
    entries.retain(|existing| {
        existing.app_version != entry.app_version || existing.bundle_version != entry.bundle_version
    });
    entries.push(entry);

    let overflow = entries.len().saturating_sub(MAX_FALLBACK_ENTRIES);
    entries.drain(..overflow).collect()
}

/// Removes the record for `pointer`, returning it if present.
pub fn take_entry(entries: &mut Vec<FallbackEntry>, pointer: &BundlePointer) -> Option<FallbackEntry> {
    let index = entries.iter().position(|e| e.is(pointer))?;
    Some(entries.remove(index))
}
