//! On-disk release list cache.
//!
//! The cache is a JSON array of releases. Its modification time is the fetch
//! time, so freshness needs no extra metadata. A corrupt cache is treated as
//! stale and overwritten by the next fetch.

use super::Release;
use crate::error::{InstallerError, Result};
use log::{debug, warn};
use nvup_common::write_atomic;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default time-to-live of a cached release list.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// The release list cache file.
#[derive(Debug, Clone)]
pub struct ReleaseCache {
    path: PathBuf,
    ttl: Duration,
}

impl ReleaseCache {
    /// A cache stored at `path` that stays fresh for `ttl`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    /// The cache file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time since the cache was written, or `None` when it does not exist.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        // A timestamp in the future counts as just written.
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Returns `true` when the cache exists and is younger than the TTL.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.age().is_some_and(|age| age <= self.ttl)
    }

    /// Return the cached releases if the cache is fresh and decodes.
    #[must_use]
    pub fn read_fresh(&self) -> Option<Vec<Release>> {
        if !self.is_fresh() {
            debug!("release cache {} is missing or stale", self.path.display());
            return None;
        }
        match self.read() {
            Ok(releases) => Some(releases),
            Err(err) => {
                warn!(
                    "ignoring unreadable release cache {}: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    fn read(&self) -> io::Result<Vec<Release>> {
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(io::Error::other)
    }

    /// Persist `releases` atomically, resetting the freshness clock.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Encode`] if serialisation fails and
    /// [`InstallerError::Filesystem`] if the file cannot be written.
    pub fn store(&self, releases: &[Release]) -> Result<()> {
        let json = serde_json::to_vec_pretty(releases).map_err(|source| InstallerError::Encode {
            what: "release cache",
            source,
        })?;
        write_atomic(&self.path, &json)
            .map_err(|source| InstallerError::fs("write", &self.path, source))?;
        debug!(
            "cached {} releases at {}",
            releases.len(),
            self.path.display()
        );
        Ok(())
    }
}
