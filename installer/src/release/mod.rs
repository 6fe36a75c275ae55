//! Upstream releases and their resolution.
//!
//! A [`Release`] mirrors one entry of the GitHub releases API. The list is
//! fetched through a [`ReleaseSource`], filtered against a minimum supported
//! version, and cached on disk with a short time-to-live so repeated commands
//! do not touch the network.
//!
//! - [`alias`] - Parsing user-facing aliases into a resolvable form
//! - [`cache`] - The on-disk release list cache
//! - [`platform`] - Asset and checksum selection per OS and architecture
//! - [`resolver`] - Filtering, caching, and alias resolution
//! - [`source`] - The upstream release list

pub mod alias;
pub mod cache;
pub mod platform;
pub mod resolver;
pub mod source;

pub use alias::{Alias, is_commit_like, normalize_tag};
pub use cache::ReleaseCache;
pub use platform::{AssetMatch, Platform, asset_for, checksum_for};
pub use resolver::{ReleaseResolver, filter_releases, resolve_alias};
pub use source::{GitHubReleaseSource, ReleaseSource};

#[cfg(test)]
pub use source::MockReleaseSource;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag of the rolling stable release.
pub const STABLE_TAG: &str = "stable";

/// Tag of the rolling nightly prerelease.
pub const NIGHTLY_TAG: &str = "nightly";

/// Length of an abbreviated commit hash.
pub const SHORT_HASH_LEN: usize = 7;

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// File name as published.
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// A published upstream release.
///
/// Immutable once fetched and identified by its tag. Field names follow the
/// GitHub API so the cache file is a filtered copy of the API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// The release tag, e.g. `v0.10.0`, `stable`, or `nightly`.
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Whether upstream marks this as a prerelease.
    #[serde(rename = "prerelease", default)]
    pub is_prerelease: bool,
    /// Attached files.
    #[serde(default)]
    pub assets: Vec<Asset>,
    /// Publication time.
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// The commit (or branch) the tag was cut from.
    #[serde(rename = "target_commitish", default)]
    pub source_commit: Option<String>,
}

impl Release {
    /// Returns `true` for the rolling `stable` and `nightly` tags.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        is_sentinel_tag(&self.tag)
    }

    /// The source commit when upstream reports a hash rather than a branch.
    #[must_use]
    pub fn commit_hash(&self) -> Option<&str> {
        self.source_commit
            .as_deref()
            .filter(|commit| commit.len() >= SHORT_HASH_LEN && is_hex(commit))
    }

    /// First seven characters of the source commit, if known.
    #[must_use]
    pub fn short_commit(&self) -> Option<&str> {
        self.commit_hash().map(|commit| &commit[..SHORT_HASH_LEN])
    }

    /// A value that changes whenever the release content changes.
    ///
    /// Semver tags are immutable, so the tag suffices. Sentinel tags are
    /// re-pointed upstream, so the commit is used, falling back to the
    /// publication time and finally the tag itself.
    ///
    /// # Examples
    ///
    /// ```
    /// use nvup_installer::release::Release;
    ///
    /// let release = Release {
    ///     tag: "v0.10.0".to_owned(),
    ///     is_prerelease: false,
    ///     assets: Vec::new(),
    ///     published_at: None,
    ///     source_commit: Some("abcdef0123456789".to_owned()),
    /// };
    /// assert_eq!(release.identifier(), "v0.10.0");
    /// ```
    #[must_use]
    pub fn identifier(&self) -> String {
        if !self.is_sentinel() {
            return self.tag.clone();
        }
        if let Some(commit) = self.commit_hash() {
            return commit.to_owned();
        }
        self.published_at
            .map_or_else(|| self.tag.clone(), |at| at.to_rfc3339())
    }
}

/// Returns `true` for the rolling `stable` and `nightly` tags.
#[must_use]
pub fn is_sentinel_tag(tag: &str) -> bool {
    tag == STABLE_TAG || tag == NIGHTLY_TAG
}

pub(crate) fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}
