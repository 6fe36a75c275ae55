//! Archive codec for downloaded releases.
//!
//! Upstream ships tarballs for Linux and macOS and ZIP archives for Windows.
//! The container is recognised from its magic bytes, never from the file
//! name, so a mislabelled download is still handled correctly.
//!
//! - [`format`] - Container detection from the stream prefix
//! - [`extraction`] - Entry materialisation with zip-slip protection
//! - [`error`] - Codec error taxonomy

pub mod error;
pub mod extraction;
pub mod format;

pub use error::ArchiveError;
pub use extraction::{ArchiveCodec, ArchiveExtractor, ExtractionSummary, extract};
pub use format::{ArchiveFormat, detect_format};

#[cfg(test)]
pub use extraction::MockArchiveExtractor;
