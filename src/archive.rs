//! Zip extraction with path containment.
//!
//! Every entry name is checked with [`resolve_within`] against the canonical
//! destination before anything is written, so entries using `..`, absolute
//! names, or symlinks planted in the destination cannot escape it. Symlink
//! entries in the archive are written as regular files holding the link text.
//!
//! Extraction is not transactional. When an entry is rejected the files
//! written before it stay on disk, and callers must treat the destination as
//! untrusted.

use crate::core::Result;
use crate::utils::fs::ensure_dir;
use crate::utils::path_validation::resolve_within;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One entry written by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Name as stored in the archive
    pub name: String,
    /// Location on disk, always inside the destination
    pub path: PathBuf,
    /// Whether the entry was a directory
    pub is_dir: bool,
    /// Uncompressed size in bytes
    pub size: u64,
}

/// Extracts zip archives into a destination directory.
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Extracts `archive` into `dest`, returning the number of files written.
    ///
    /// # Errors
    ///
    /// - [`crate::core::AbuError::PathTraversal`] if any entry would land outside `dest`
    /// - [`crate::core::AbuError::PlatformUnsupported`] for unsupported compression
    /// - [`crate::core::AbuError::IoError`] for unreadable archives or write failures
    pub async fn extract(archive: &Path, dest: &Path) -> Result<usize> {
        Self::extract_with(archive, dest, |_| {}).await
    }

    /// Like [`ArchiveExtractor::extract`], calling `on_entry` after each entry is written.
    pub async fn extract_with<F>(archive: &Path, dest: &Path, mut on_entry: F) -> Result<usize>
    where
        F: FnMut(&ExtractedEntry) + Send + 'static,
    {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&archive, &dest, &mut on_entry))
            .await
            .map_err(io::Error::other)?
    }

    /// Synchronous extraction; runs on the calling thread.
    pub fn extract_blocking(
        archive: &Path,
        dest: &Path,
        on_entry: &mut dyn FnMut(&ExtractedEntry),
    ) -> Result<usize> {
        info!("Extracting {} into {}", archive.display(), dest.display());

        ensure_dir(dest)?;
        let root = dest.canonicalize()?;

        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(BufReader::new(file))?;
        let mut written = 0;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            let name = entry.name().to_string();
            let target = resolve_within(&root, &name)?;

            if target == root {
                continue;
            }

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                // Never write through a link left by an earlier entry or install.
                if target.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
                    fs::remove_file(&target)?;
                }
                if entry.is_symlink() {
                    debug!("Materializing symlink entry {name} as a regular file");
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                out.sync_all()?;
                written += 1;
            }

            on_entry(&ExtractedEntry {
                name,
                path: target,
                is_dir: entry.is_dir(),
                size: entry.size(),
            });
        }

        debug!("Extracted {written} files from {}", archive.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AbuError;
    use crate::test_utils::fixtures::{ZipEntry, write_zip};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_nested_tree() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle.zip");
        write_zip(
            &archive,
            &[
                ZipEntry::Dir("assets/"),
                ZipEntry::File("assets/img/logo.png", b"png"),
                ZipEntry::File("main.jsbundle.hbc", b"bytecode"),
            ],
        )
        .unwrap();
        let dest = temp.path().join("out");

        let written = ArchiveExtractor::extract(&archive, &dest).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(fs::read(dest.join("assets/img/logo.png")).unwrap(), b"png");
        assert_eq!(fs::read(dest.join("main.jsbundle.hbc")).unwrap(), b"bytecode");
    }

    #[tokio::test]
    async fn test_extract_reports_each_entry() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bundle.zip");
        write_zip(&archive, &[ZipEntry::File("a.txt", b"a"), ZipEntry::File("b/c.txt", b"c")])
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        ArchiveExtractor::extract_with(&archive, &temp.path().join("out"), move |entry| {
            sink.lock().unwrap().push(entry.name.clone());
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a.txt".to_string(), "b/c.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_extract_rejects_parent_traversal_at_any_depth() {
        for name in ["../evil.txt", "a/../../evil.txt", "a/b/c/d/../../../../../evil.txt"] {
            let temp = TempDir::new().unwrap();
            let archive = temp.path().join("evil.zip");
            write_zip(&archive, &[ZipEntry::File(name, b"owned")]).unwrap();
            let dest = temp.path().join("nested").join("out");

            let err = ArchiveExtractor::extract(&archive, &dest).await.unwrap_err();

            assert!(matches!(err, AbuError::PathTraversal { .. }), "{name}");
            assert!(!temp.path().join("nested").join("evil.txt").exists());
            assert!(!temp.path().join("evil.txt").exists());
        }
    }

    #[tokio::test]
    async fn test_extract_rejects_absolute_entry() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[ZipEntry::File("/tmp/abu-absolute-entry.txt", b"owned")]).unwrap();

        let err = ArchiveExtractor::extract(&archive, &temp.path().join("out")).await.unwrap_err();

        assert!(matches!(err, AbuError::PathTraversal { .. }));
    }

    #[tokio::test]
    async fn test_partial_extraction_is_left_behind() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[ZipEntry::File("good.txt", b"ok"), ZipEntry::File("../bad.txt", b"x")])
            .unwrap();
        let dest = temp.path().join("out");

        assert!(ArchiveExtractor::extract(&archive, &dest).await.is_err());
        assert!(dest.join("good.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_rejects_symlink_in_destination() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let dest = temp.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        std::os::unix::fs::symlink(outside.path(), dest.join("escape")).unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[ZipEntry::File("escape/payload.txt", b"owned")]).unwrap();

        let err = ArchiveExtractor::extract(&archive, &dest).await.unwrap_err();

        assert!(matches!(err, AbuError::PathTraversal { .. }));
        assert!(!outside.path().join("payload.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_entry_is_written_as_regular_file() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("links.zip");
        write_zip(&archive, &[ZipEntry::Symlink("link", "/etc/passwd")]).unwrap();
        let dest = temp.path().join("out");

        ArchiveExtractor::extract(&archive, &dest).await.unwrap();

        let meta = fs::symlink_metadata(dest.join("link")).unwrap();
        assert!(meta.file_type().is_file());
        assert_eq!(fs::read_to_string(dest.join("link")).unwrap(), "/etc/passwd");
    }

    #[tokio::test]
    async fn test_extract_unreadable_archive_is_io_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let err = ArchiveExtractor::extract(&archive, &temp.path().join("out")).await.unwrap_err();

        assert!(matches!(err, AbuError::IoError(_)));
    }
}
