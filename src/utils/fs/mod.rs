//! File system helpers shared by the ledger, the extractor and the orchestrators.
//!
//! Everything persisted by the updater (ledger, fallback list, configuration) goes
//! through [`atomic_write`] so that a crash mid-write never leaves an unparsable
//! file behind. Directory helpers are tolerant of paths that are already in the
//! requested state.

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, atomic_write_json};
pub use dirs::{ensure_dir, ensure_parent_dir, remove_dir_if_exists, remove_file_if_exists};
