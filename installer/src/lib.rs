//! nvup installer library.
//!
//! This crate provides the core functionality for installing, switching, and
//! rolling back Neovim versions. It is used by the `nvup` CLI binary and can
//! be consumed programmatically for testing or custom workflows.
//!
//! # Modules
//!
//! - [`archive`] - Archive format detection and safe extraction
//! - [`checksum`] - SHA-256 digests and checksum file parsing
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - TOML configuration and defaults
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`download`] - Streaming HTTP downloads with cancellation
//! - [`error`] - Semantic error types with recovery hints
//! - [`history`] - Bounded history of superseded nightly builds
//! - [`layout`] - On-disk layout of installed versions and state
//! - [`list_output`] - Output formatting for version listings
//! - [`manager`] - The version manager facade used by the CLI
//! - [`output`] - Outcome messages and shell snippets
//! - [`pipeline`] - The staged, atomic install pipeline
//! - [`progress`] - Install progress reporting
//! - [`release`] - Upstream releases, aliases, and the release cache
//! - [`rollback`] - Restoring a preserved nightly build
//! - [`source_build`] - Building from a source commit
//! - [`switch`] - Pointing `current` and the launcher at a version

pub mod archive;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod dirs;
pub mod download;
pub mod error;
pub mod history;
pub mod layout;
pub mod list_output;
pub mod manager;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod release;
pub mod rollback;
pub mod source_build;
pub mod switch;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
