//! User-facing version aliases.

use super::{NIGHTLY_TAG, SHORT_HASH_LEN, STABLE_TAG, is_hex, is_sentinel_tag};
use crate::error::InstallerError;
use std::fmt;
use std::str::FromStr;

/// Length of a full SHA-1 commit hash.
const FULL_HASH_LEN: usize = 40;

/// Branch name treated as a source-build reference.
const DEFAULT_BRANCH: &str = "master";

/// A requested version in the form the resolver understands.
///
/// # Examples
///
/// ```
/// use nvup_installer::release::Alias;
///
/// assert_eq!("0.10.0".parse::<Alias>().unwrap(), Alias::Tag("v0.10.0".to_owned()));
/// assert_eq!("stable".parse::<Alias>().unwrap(), Alias::Stable);
/// assert!("27fb629".parse::<Alias>().unwrap().is_commit());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Alias {
    /// The newest non-prerelease.
    Stable,
    /// The newest nightly prerelease.
    Nightly,
    /// An exact release tag, normalised to carry a leading `v`.
    Tag(String),
    /// A commit hash or `master`, installed by building from source.
    Commit(String),
}

impl Alias {
    /// Returns `true` when this alias must be built from source.
    #[must_use]
    pub fn is_commit(&self) -> bool {
        matches!(self, Self::Commit(_))
    }

    /// The alias in its normalised textual form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stable => STABLE_TAG,
            Self::Nightly => NIGHTLY_TAG,
            Self::Tag(tag) => tag,
            Self::Commit(commit) => commit,
        }
    }
}

impl FromStr for Alias {
    type Err = InstallerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(InstallerError::AliasNotFound {
                alias: value.to_owned(),
            });
        }
        Ok(match value {
            STABLE_TAG => Self::Stable,
            NIGHTLY_TAG => Self::Nightly,
            _ if is_commit_like(value) => Self::Commit(value.to_owned()),
            _ => Self::Tag(normalize_tag(value)),
        })
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` for `master` and for 7- or 40-character hex strings.
///
/// # Examples
///
/// ```
/// use nvup_installer::release::is_commit_like;
///
/// assert!(is_commit_like("master"));
/// assert!(is_commit_like("27fb629"));
/// assert!(!is_commit_like("0.10.0"));
/// ```
#[must_use]
pub fn is_commit_like(value: &str) -> bool {
    value == DEFAULT_BRANCH
        || (matches!(value.len(), SHORT_HASH_LEN | FULL_HASH_LEN) && is_hex(value))
}

/// Prepend `v` to a bare version unless it is a sentinel, commit-like, or
/// already prefixed.
#[must_use]
pub fn normalize_tag(value: &str) -> String {
    if is_sentinel_tag(value) || is_commit_like(value) || value.starts_with('v') {
        value.to_owned()
    } else {
        format!("v{value}")
    }
}
