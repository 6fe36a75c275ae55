//! Platform directory resolution.
//!
//! Wraps `directories-next` behind a trait so configuration defaults can be
//! tested without touching the real home directory.

use std::path::PathBuf;

/// Application directory name under the platform data and config roots.
const APP_DIR: &str = "nvup";

/// Source of platform-specific base directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Directory holding `config.toml`, e.g. `~/.config/nvup`.
    fn config_dir(&self) -> Option<PathBuf>;

    /// Directory holding installed versions and state, e.g.
    /// `~/.local/share/nvup`.
    fn data_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the operating system's conventions.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    dirs: directories_next::BaseDirs,
}

impl SystemBaseDirs {
    /// Resolve the platform directories.
    ///
    /// Returns `None` when no home directory can be determined.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use nvup_installer::dirs::{BaseDirs, SystemBaseDirs};
    ///
    /// let dirs = SystemBaseDirs::new().expect("home directory");
    /// assert!(dirs.data_dir().is_some());
    /// ```
    #[must_use]
    pub fn new() -> Option<Self> {
        directories_next::BaseDirs::new().map(|dirs| Self { dirs })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        Some(self.dirs.home_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<PathBuf> {
        Some(self.dirs.config_dir().join(APP_DIR))
    }

    fn data_dir(&self) -> Option<PathBuf> {
        Some(self.dirs.data_local_dir().join(APP_DIR))
    }
}
