//! Error types for the nvup version manager.
//!
//! Variants are grouped by how a caller should react: transient network
//! failures, integrity failures, archive format failures, filesystem and lock
//! failures, and not-found conditions that carry a remediation hint. Outcomes
//! that merely report an already-satisfied request (up to date, already
//! active, nothing to roll back) are not errors and live with the operations
//! that produce them.

use crate::archive::ArchiveError;
use crate::download::DownloadError;
use crate::pipeline::Stage;
use nvup_common::{Cancelled, LockError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving, installing, or switching versions.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The upstream release list could not be fetched or decoded.
    #[error("failed to fetch releases from {url}: {reason}")]
    ReleaseList {
        /// The release API endpoint.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// A download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The downloaded archive does not match its published checksum.
    #[error("checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The asset that failed verification.
        asset: String,
        /// The published digest.
        expected: String,
        /// The digest of the downloaded bytes.
        actual: String,
    },

    /// A checksum is published for the asset but could not be fetched.
    #[error("checksum for {asset} is published at {url} but could not be fetched: {reason}")]
    ChecksumUnavailable {
        /// The asset being verified.
        asset: String,
        /// The checksum asset URL.
        url: String,
        /// Description of the fetch failure.
        reason: String,
    },

    /// The checksum file does not contain a usable digest for the asset.
    #[error("invalid checksum file for {asset}: {reason}")]
    InvalidChecksum {
        /// The asset being verified.
        asset: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// The archive could not be recognised or extracted.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// An advisory lock could not be acquired.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The operation was cancelled or ran past its deadline.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// A filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Filesystem {
        /// What was being attempted, e.g. `"rename"`.
        action: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON state file could not be encoded.
    #[error("failed to encode {what}: {source}")]
    Encode {
        /// Which state file was being written.
        what: &'static str,
        /// Underlying serialisation error.
        #[source]
        source: serde_json::Error,
    },

    /// No release matches the requested alias.
    #[error("no release found for {alias}; try `nvup install stable` or an exact tag such as v0.10.0")]
    AliasNotFound {
        /// The alias as requested.
        alias: String,
    },

    /// The named version is not installed.
    #[error("version {name} is not installed; run: nvup install {name}")]
    VersionNotInstalled {
        /// The version name.
        name: String,
    },

    /// The version directory already exists and the request did not say how
    /// to treat it.
    #[error("version {name} is already installed at {path}")]
    VersionExists {
        /// The version name.
        name: String,
        /// The existing directory.
        path: PathBuf,
    },

    /// The version is the active one and cannot be removed.
    #[error("version {name} is in use; run: nvup use <other-version> before uninstalling it")]
    VersionInUse {
        /// The version name.
        name: String,
    },

    /// The version name is not usable as a directory name.
    #[error("invalid version name {name:?}: {reason}")]
    InvalidVersionName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// An installed version contains no editor executable.
    #[error("no nvim executable found in {path}; reinstall with: nvup uninstall {name} && nvup install {name}")]
    BinaryNotFound {
        /// The version name.
        name: String,
        /// The version directory that was searched.
        path: PathBuf,
    },

    /// No asset patterns exist for this operating system and architecture.
    #[error("unsupported platform {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system identifier.
        os: String,
        /// CPU architecture identifier.
        arch: String,
    },

    /// The release publishes no asset for this platform.
    #[error("release {tag} has no asset for {os}/{arch}")]
    NoAssetForPlatform {
        /// The release tag.
        tag: String,
        /// Operating system identifier.
        os: String,
        /// CPU architecture identifier.
        arch: String,
    },

    /// The requested history index does not exist.
    #[error(
        "history index {index} is out of range; valid range 0-{}",
        .len.saturating_sub(1)
    )]
    HistoryIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// Number of recorded entries.
        len: usize,
    },

    /// The configuration file is invalid.
    #[error("invalid configuration in {path}: {reason}")]
    Config {
        /// The configuration file.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A git operation failed.
    #[error("git {operation} failed: {message}")]
    Git {
        /// The git subcommand.
        operation: &'static str,
        /// Captured error output.
        message: String,
    },

    /// A source build step failed.
    #[error("source build of {reference} failed: {reason}")]
    Build {
        /// The commit or branch being built.
        reference: String,
        /// Description of the failure.
        reason: String,
    },

    /// An install pipeline stage failed for a named version.
    #[error(transparent)]
    Install(Box<InstallError>),
}

/// A pipeline failure annotated with the version and stage that failed.
#[derive(Debug, Error)]
#[error("installing {name} failed during {stage}: {source}")]
pub struct InstallError {
    /// The version being installed.
    pub name: String,
    /// The stage that failed.
    pub stage: Stage,
    /// The underlying failure.
    #[source]
    pub source: InstallerError,
}

impl InstallerError {
    /// Wrap this error with the version name and pipeline stage.
    #[must_use]
    pub fn during(self, name: &str, stage: Stage) -> Self {
        match self {
            // Already annotated by an inner stage.
            Self::Install(_) => self,
            other => Self::Install(Box::new(InstallError {
                name: name.to_owned(),
                stage,
                source: other,
            })),
        }
    }

    /// Build a [`Self::Filesystem`] error for `path`.
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    /// The failing stage, when this error came out of the install pipeline.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Install(inner) => Some(inner.stage),
            _ => None,
        }
    }

    /// The innermost error, with any stage annotation removed.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Install(inner) => inner.source.root(),
            other => other,
        }
    }

    /// Returns `true` if the operation stopped because it was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.root(),
            Self::Cancelled(_)
                | Self::Download(DownloadError::Cancelled(_))
                | Self::Archive(ArchiveError::Cancelled(_))
                | Self::Lock(LockError::Cancelled { .. })
        )
    }
}

/// Result type for installer operations.
pub type Result<T> = std::result::Result<T, InstallerError>;
