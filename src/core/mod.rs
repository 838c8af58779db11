//! Core types shared by every updater module.
//!
//! [`AbuError`] is the single error taxonomy of the pipeline and
//! [`ErrorContext`] adds user-facing suggestions for the CLI.

pub mod error;

pub use error::{AbuError, ErrorContext, Result, user_friendly_error};
