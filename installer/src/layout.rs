//! On-disk layout of installed versions and state files.
//!
//! ```text
//! <data_dir>/
//!   versions/
//!     v0.10.0/              installed version
//!       .nvup-identifier    content marker
//!     nightly/
//!     nightly-27fb629/      nightly backup
//!     current -> v0.10.0    active version pointer
//!   cache/releases.json
//!   nightly-history.json
//!   downloads/              transient archives
//!   source/                 git checkout for source builds
//! <launcher_dir>/nvim -> <data_dir>/versions/v0.10.0/bin/nvim
//! ```

use crate::error::{InstallerError, Result};
use crate::release::NIGHTLY_TAG;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;

/// Directory holding one subdirectory per installed version.
pub const VERSIONS_DIR: &str = "versions";

/// Name of the active-version pointer inside the versions directory.
pub const CURRENT_LINK: &str = "current";

/// Marker file recording what an installed directory contains.
pub const IDENTIFIER_FILE: &str = ".nvup-identifier";

/// Editor executable name on this platform.
pub const BINARY_NAME: &str = if cfg!(windows) { "nvim.exe" } else { "nvim" };

/// Resolved paths for one nvup installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    data_dir: Utf8PathBuf,
    launcher_dir: Utf8PathBuf,
}

impl Layout {
    /// A layout rooted at `data_dir` with the launcher in `launcher_dir`.
    #[must_use]
    pub fn new(data_dir: Utf8PathBuf, launcher_dir: Utf8PathBuf) -> Self {
        Self {
            data_dir,
            launcher_dir,
        }
    }

    /// Root of all state.
    #[must_use]
    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    /// Directory containing the launcher link.
    #[must_use]
    pub fn launcher_dir(&self) -> &Utf8Path {
        &self.launcher_dir
    }

    /// The global launcher link.
    #[must_use]
    pub fn launcher_link(&self) -> Utf8PathBuf {
        self.launcher_dir.join(BINARY_NAME)
    }

    /// Directory holding installed versions.
    #[must_use]
    pub fn versions_dir(&self) -> Utf8PathBuf {
        self.data_dir.join(VERSIONS_DIR)
    }

    /// Directory of the installed version `name`.
    #[must_use]
    pub fn version_dir(&self, name: &str) -> Utf8PathBuf {
        self.versions_dir().join(name)
    }

    /// The active-version pointer.
    #[must_use]
    pub fn current_link(&self) -> Utf8PathBuf {
        self.versions_dir().join(CURRENT_LINK)
    }

    /// The identifier marker inside version `name`.
    #[must_use]
    pub fn identifier_path(&self, name: &str) -> Utf8PathBuf {
        self.version_dir(name).join(IDENTIFIER_FILE)
    }

    /// Name of the nightly backup for commit `short_hash`.
    #[must_use]
    pub fn backup_name(short_hash: &str) -> String {
        format!("{NIGHTLY_TAG}-{short_hash}")
    }

    /// Directory of the nightly backup for commit `short_hash`.
    #[must_use]
    pub fn backup_dir(&self, short_hash: &str) -> Utf8PathBuf {
        self.version_dir(&Self::backup_name(short_hash))
    }

    /// The release list cache file.
    #[must_use]
    pub fn cache_file(&self) -> Utf8PathBuf {
        self.data_dir.join("cache").join("releases.json")
    }

    /// The nightly history file.
    #[must_use]
    pub fn history_file(&self) -> Utf8PathBuf {
        self.data_dir.join("nightly-history.json")
    }

    /// Scratch directory for in-flight downloads.
    #[must_use]
    pub fn downloads_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("downloads")
    }

    /// Git checkout used for source builds.
    #[must_use]
    pub fn source_dir(&self) -> Utf8PathBuf {
        self.data_dir.join("source")
    }

    /// Returns `true` when version `name` has a committed directory.
    #[must_use]
    pub fn is_installed(&self, name: &str) -> bool {
        self.version_dir(name).is_dir()
    }

    /// Read the identifier recorded for version `name`.
    ///
    /// `None` when the version or its marker is absent.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the marker exists but
    /// cannot be read.
    pub fn read_identifier(&self, name: &str) -> Result<Option<String>> {
        let path = self.identifier_path(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents.trim().to_owned())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(InstallerError::fs("read", path, source)),
        }
    }

    /// Create the versions directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] on failure.
    pub fn ensure_versions_dir(&self) -> Result<Utf8PathBuf> {
        let dir = self.versions_dir();
        fs::create_dir_all(&dir).map_err(|source| InstallerError::fs("create", &dir, source))?;
        Ok(dir)
    }
}

/// Reject version names that are not a single plain path component.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidVersionName`] for empty names, names
/// containing separators or `..`, hidden names, and the reserved `current`.
///
/// # Examples
///
/// ```
/// use nvup_installer::layout::validate_version_name;
///
/// assert!(validate_version_name("v0.10.0").is_ok());
/// assert!(validate_version_name("../etc").is_err());
/// ```
pub fn validate_version_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == CURRENT_LINK {
        Some("name is reserved for the active version pointer")
    } else if name.starts_with('.') {
        Some("name must not start with '.'")
    } else if name.contains(['/', '\\']) || name.contains("..") {
        Some("name must be a single path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(InstallerError::InvalidVersionName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn layout() -> Layout {
        Layout::new(
            Utf8PathBuf::from("/data/nvup"),
            Utf8PathBuf::from("/home/user/.local/bin"),
        )
    }

    #[rstest]
    fn paths_follow_the_documented_layout(layout: Layout) {
        assert_eq!(layout.version_dir("v0.10.0"), "/data/nvup/versions/v0.10.0");
        assert_eq!(layout.current_link(), "/data/nvup/versions/current");
        assert_eq!(layout.backup_dir("27fb629"), "/data/nvup/versions/nightly-27fb629");
        assert_eq!(layout.cache_file(), "/data/nvup/cache/releases.json");
        assert_eq!(layout.history_file(), "/data/nvup/nightly-history.json");
        assert_eq!(
            layout.identifier_path("nightly"),
            "/data/nvup/versions/nightly/.nvup-identifier"
        );
        assert_eq!(
            layout.launcher_link(),
            Utf8PathBuf::from("/home/user/.local/bin").join(BINARY_NAME)
        );
    }

    #[test]
    fn identifier_round_trips_and_is_absent_when_missing() {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
        let layout = Layout::new(root.clone(), root.join("bin"));

        assert_eq!(layout.read_identifier("nightly").expect("read"), None);

        fs::create_dir_all(layout.version_dir("nightly")).expect("version dir");
        fs::write(layout.identifier_path("nightly"), "27fb629\n").expect("marker");

        assert_eq!(
            layout.read_identifier("nightly").expect("read").as_deref(),
            Some("27fb629")
        );
        assert!(layout.is_installed("nightly"));
    }

    #[rstest]
    #[case::empty("")]
    #[case::reserved("current")]
    #[case::hidden(".trash")]
    #[case::nested("a/b")]
    #[case::parent("..")]
    fn rejects_unsafe_names(#[case] name: &str) {
        assert!(matches!(
            validate_version_name(name),
            Err(InstallerError::InvalidVersionName { .. })
        ));
    }

    #[rstest]
    #[case("v0.10.0")]
    #[case("nightly")]
    #[case("nightly-27fb629")]
    #[case("27fb62988e922c2739035f477f93cc052a4fee1e")]
    fn accepts_version_names(#[case] name: &str) {
        assert!(validate_version_name(name).is_ok());
    }
}
