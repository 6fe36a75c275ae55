//! Active version pointer and launcher link.
//!
//! The `current` link in the versions directory names the active version.
//! The launcher link in the user's bin directory points straight at that
//! version's `nvim` binary, so shells pick up a switch without any wrapper.
//! Both links are replaced through [`update_link`] while the target
//! version's lock is held, so a concurrent uninstall cannot remove the
//! directory underneath a switch.

use crate::error::{InstallerError, Result};
use crate::layout::{BINARY_NAME, Layout};
use camino::Utf8Path;
use log::{debug, info};
use nvup_common::{AdvisoryLock, CancelToken, LinkKind, read_link_target, update_link};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// Relative binary locations seen in upstream archives, checked in order
/// before falling back to a directory scan.
const KNOWN_LAYOUTS: &[&str] = &[
    "bin/nvim",
    "nvim-linux-x86_64/bin/nvim",
    "nvim-linux-arm64/bin/nvim",
    "nvim-linux64/bin/nvim",
    "nvim-macos-arm64/bin/nvim",
    "nvim-macos-x86_64/bin/nvim",
    "nvim-macos/bin/nvim",
    "nvim-osx64/bin/nvim",
    "nvim-win64/bin/nvim.exe",
    "Neovim/bin/nvim.exe",
];

/// Deepest level searched when no known layout matches.
const SCAN_DEPTH: usize = 5;

/// Moves the active version pointer.
#[derive(Debug, Clone)]
pub struct SwitchEngine<'a> {
    layout: &'a Layout,
    lock_timeout: Duration,
}

impl<'a> SwitchEngine<'a> {
    /// An engine operating on `layout`, waiting at most `lock_timeout` for a
    /// version lock.
    #[must_use]
    pub fn new(layout: &'a Layout, lock_timeout: Duration) -> Self {
        Self {
            layout,
            lock_timeout,
        }
    }

    /// Name of the active version, or `None` when nothing is active.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the pointer exists but
    /// cannot be read.
    pub fn current(&self) -> Result<Option<String>> {
        let link = self.layout.current_link();
        let target = read_link_target(link.as_std_path())
            .map_err(|source| InstallerError::fs("read", &link, source))?;
        Ok(target.and_then(|t| t.file_name().map(|n| n.to_string_lossy().into_owned())))
    }

    /// Point `current` and the launcher at installed version `name`.
    ///
    /// Returns the binary the launcher now resolves to.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::VersionNotInstalled`],
    /// [`InstallerError::BinaryNotFound`], [`InstallerError::Lock`] when the
    /// version lock is not obtained in time, or
    /// [`InstallerError::Filesystem`] when a link cannot be replaced.
    pub fn point_to(&self, name: &str, cancel: &CancelToken) -> Result<PathBuf> {
        let version_dir = self.layout.version_dir(name);
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        let _lock = AdvisoryLock::acquire(version_dir.as_std_path(), &lock_cancel)?;

        let binary = locate_binary(self.layout, name)?;

        let current = self.layout.current_link();
        let method = update_link(
            version_dir.as_std_path(),
            current.as_std_path(),
            LinkKind::Directory,
        )
        .map_err(|source| InstallerError::fs("link", &current, source))?;
        debug!("{current} -> {version_dir} ({method:?})");

        let launcher = self.layout.launcher_link();
        let method = update_link(&binary, launcher.as_std_path(), LinkKind::File)
            .map_err(|source| InstallerError::fs("link", &launcher, source))?;
        debug!("{launcher} -> {} ({method:?})", binary.display());

        info!("now using {name}");
        Ok(binary)
    }
}

/// Find the editor binary inside installed version `name`.
///
/// Known archive layouts are tried first, then a scan of at most five levels
/// for an executable named `nvim` (`nvim.exe` on Windows).
///
/// # Errors
///
/// Returns [`InstallerError::VersionNotInstalled`] when the version
/// directory is missing and [`InstallerError::BinaryNotFound`] when it holds
/// no binary.
pub fn locate_binary(layout: &Layout, name: &str) -> Result<PathBuf> {
    let version_dir = layout.version_dir(name);
    if !version_dir.is_dir() {
        return Err(InstallerError::VersionNotInstalled {
            name: name.to_owned(),
        });
    }

    find_binary(&version_dir).ok_or_else(|| InstallerError::BinaryNotFound {
        name: name.to_owned(),
        path: version_dir.into_std_path_buf(),
    })
}

fn find_binary(version_dir: &Utf8Path) -> Option<PathBuf> {
    let known = KNOWN_LAYOUTS
        .iter()
        .map(|relative| version_dir.join(relative).into_std_path_buf())
        .find(|candidate| is_executable(candidate));
    if known.is_some() {
        return known;
    }

    WalkDir::new(version_dir)
        .max_depth(SCAN_DEPTH)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_name() == BINARY_NAME)
        .map(walkdir::DirEntry::into_path)
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
