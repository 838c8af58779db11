//! Path containment checks for untrusted, archive-relative names.
//!
//! Entry names coming out of a downloaded archive or a bundle manifest are
//! attacker controlled. Two layers of checks are applied before such a name is
//! allowed to touch the file system:
//!
//! 1. [`normalize_relative`] rejects names that are absolute, carry a drive
//!    prefix, or contain a `..` component anywhere.
//! 2. [`resolve_within`] joins the name onto a canonical root and canonicalizes
//!    the deepest part of the result that already exists on disk. Symlinks are
//!    resolved by the operating system, so a link planted by an earlier entry
//!    cannot redirect a later write outside the root.

use crate::core::{AbuError, Result};
use std::path::{Component, Path, PathBuf};

/// Converts an untrusted relative name into a clean relative path.
///
/// `.` components are dropped. Returns `None` for absolute names, Windows
/// prefixes, and any name containing a `..` component, regardless of depth.
#[must_use]
pub fn normalize_relative(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Resolves `name` under `root` and proves the result stays inside `root`.
///
/// `root` must already be canonical. The returned path is `root/name` (not
/// canonicalized) so callers write exactly where the entry says.
///
/// # Errors
///
/// Returns [`AbuError::PathTraversal`] if the name is rejected by
/// [`normalize_relative`], if the deepest existing ancestor resolves outside
/// `root`, or if that ancestor is a dangling symlink.
pub fn resolve_within(root: &Path, name: &str) -> Result<PathBuf> {
    let traversal = || AbuError::PathTraversal {
        entry: name.to_string(),
    };

    let relative = normalize_relative(name).ok_or_else(traversal)?;
    let candidate = root.join(&relative);

    let anchor = deepest_existing(&candidate).ok_or_else(traversal)?;
    let canonical = anchor.canonicalize().map_err(|_| traversal())?;

    if !canonical.starts_with(root) {
        return Err(traversal());
    }

    Ok(candidate)
}

// `symlink_metadata` so a dangling link counts as existing and fails to canonicalize.
fn deepest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| !p.as_os_str().is_empty() && p.symlink_metadata().is_ok())
}
