//! Errors raised by the archive codec.

use nvup_common::Cancelled;
use std::path::PathBuf;

/// Errors arising from archive detection and extraction.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The stream contained no bytes.
    #[error("archive is empty")]
    EmptyInput,

    /// The leading bytes match no supported container.
    #[error("unsupported archive format (leading bytes: {prefix})")]
    UnsupportedFormat {
        /// Hex rendering of the sniffed prefix.
        prefix: String,
    },

    /// An entry path is absolute or climbs out of the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The container structure could not be decoded.
    #[error("corrupt archive: {reason}")]
    Corrupt {
        /// Description of the decoding failure.
        reason: String,
    },

    /// An entry could not be materialised on disk.
    #[error("failed to extract {path}: {source}")]
    Entry {
        /// Destination path of the entry.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// I/O error reading the archive stream.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Extraction stopped between entries.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl ArchiveError {
    pub(crate) fn corrupt(reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            reason: reason.to_string(),
        }
    }
}
