//! Utility modules shared across the updater.
//!
//! - [`fs`]: atomic writes and tolerant directory helpers
//! - [`path_validation`]: containment checks for untrusted relative names
//! - [`progress`]: terminal progress bars for the CLI

pub mod fs;
pub mod path_validation;
pub mod progress;

pub use fs::{atomic_write, atomic_write_json, ensure_dir, remove_dir_if_exists};
pub use path_validation::{normalize_relative, resolve_within};
