//! Release list filtering, caching, and alias resolution.

use super::{Alias, Release, ReleaseCache, ReleaseSource, is_sentinel_tag};
use crate::error::{InstallerError, Result};
use log::{debug, info};
use semver::Version;

/// Drop releases older than `min_version`.
///
/// Sentinel tags are always kept. Tags that are not valid semver are skipped
/// rather than treated as errors, since upstream has published a handful of
/// irregular tags over the years.
///
/// # Examples
///
/// ```
/// use nvup_installer::release::{Release, filter_releases};
/// use semver::Version;
///
/// let make = |tag: &str| Release {
///     tag: tag.to_owned(),
///     is_prerelease: false,
///     assets: Vec::new(),
///     published_at: None,
///     source_commit: None,
/// };
/// let kept = filter_releases(
///     vec![make("stable"), make("v0.10.0"), make("v0.4.4")],
///     Some(&Version::new(0, 5, 0)),
/// );
/// let tags: Vec<_> = kept.iter().map(|r| r.tag.as_str()).collect();
/// assert_eq!(tags, ["stable", "v0.10.0"]);
/// ```
#[must_use]
pub fn filter_releases(releases: Vec<Release>, min_version: Option<&Version>) -> Vec<Release> {
    let Some(min_version) = min_version else {
        return releases;
    };
    releases
        .into_iter()
        .filter(|release| {
            if is_sentinel_tag(&release.tag) {
                return true;
            }
            let bare = release.tag.strip_prefix('v').unwrap_or(&release.tag);
            match Version::parse(bare) {
                Ok(version) => version >= *min_version,
                Err(err) => {
                    debug!("skipping release {}: {err}", release.tag);
                    false
                }
            }
        })
        .collect()
}

/// Pick the release an alias refers to from a newest-first list.
///
/// # Errors
///
/// Returns [`InstallerError::AliasNotFound`] when nothing matches. Commit
/// aliases never match a published release.
pub fn resolve_alias<'a>(releases: &'a [Release], alias: &Alias) -> Result<&'a Release> {
    let found = match alias {
        Alias::Stable => releases.iter().find(|r| !r.is_prerelease),
        Alias::Nightly => releases
            .iter()
            .find(|r| r.is_prerelease && r.tag.starts_with(super::NIGHTLY_TAG)),
        Alias::Tag(tag) => releases.iter().find(|r| r.tag == *tag),
        Alias::Commit(_) => None,
    };
    found.ok_or_else(|| InstallerError::AliasNotFound {
        alias: alias.to_string(),
    })
}

/// Resolves aliases against a cached, filtered upstream release list.
pub struct ReleaseResolver<'a> {
    source: &'a dyn ReleaseSource,
    cache: ReleaseCache,
    min_version: Option<Version>,
}

impl<'a> ReleaseResolver<'a> {
    /// A resolver over `source`, caching in `cache`, ignoring releases older
    /// than `min_version`.
    #[must_use]
    pub fn new(
        source: &'a dyn ReleaseSource,
        cache: ReleaseCache,
        min_version: Option<Version>,
    ) -> Self {
        Self {
            source,
            cache,
            min_version,
        }
    }

    /// The cache backing this resolver.
    #[must_use]
    pub fn cache(&self) -> &ReleaseCache {
        &self.cache
    }

    /// Return the release list, from cache when fresh unless forced.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ReleaseList`] when a fetch is needed and
    /// fails, or a filesystem error when the fresh list cannot be cached.
    pub fn get_releases(&self, force_refresh: bool) -> Result<Vec<Release>> {
        if !force_refresh {
            if let Some(releases) = self.cache.read_fresh() {
                debug!("using {} cached releases", releases.len());
                return Ok(releases);
            }
        }

        info!("refreshing release list");
        let fetched = self.source.fetch_releases()?;
        let releases = filter_releases(fetched, self.min_version.as_ref());
        self.cache.store(&releases)?;
        Ok(releases)
    }

    /// Resolve `alias` to a concrete release.
    ///
    /// # Errors
    ///
    /// As for [`Self::get_releases`], plus [`InstallerError::AliasNotFound`].
    pub fn resolve(&self, alias: &Alias, force_refresh: bool) -> Result<Release> {
        let releases = self.get_releases(force_refresh)?;
        resolve_alias(&releases, alias).cloned()
    }
}
