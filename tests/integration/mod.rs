//! Integration test suite for abu
//!
//! End-to-end tests that drive the updaters against a loopback HTTP server and
//! run the `abu` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **server**: Loopback HTTP server serving fixed files
//! - **support**: Updater construction and event recording
//! - **download**: Progress reporting, single-flight and cancellation
//! - **install_flow**: Full bundle installs over HTTP and rollback
//! - **package_flow**: Native packages with signature sidecars
//! - **cli**: The `abu` binary

mod cli;
mod download;
mod install_flow;
mod package_flow;
mod server;
mod support;
