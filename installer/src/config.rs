//! User configuration loaded from `config.toml`.
//!
//! Every key is optional; omitted keys fall back to the defaults below, and a
//! missing file means "all defaults". Unknown keys are rejected so typos
//! surface instead of being silently ignored.
//!
//! ```toml
//! data_dir = "~/.local/share/nvup"
//! launcher_dir = "~/.local/bin"
//! min_version = "0.7.0"
//! history_limit = 3
//! ```

use crate::dirs::BaseDirs;
use crate::error::{InstallerError, Result};
use crate::layout::Layout;
use camino::Utf8PathBuf;
use log::debug;
use nvup_common::CancelToken;
use semver::Version;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "NVUP_CONFIG";

/// File name of the configuration under the config directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Release list endpoint for Neovim.
pub const DEFAULT_RELEASE_API_URL: &str = "https://api.github.com/repos/neovim/neovim/releases";

/// Git remote used for source builds.
pub const DEFAULT_SOURCE_REPO_URL: &str = "https://github.com/neovim/neovim";

/// Oldest release offered for install.
pub const DEFAULT_MIN_VERSION: &str = "0.5.0";

/// Nightly backups kept for rollback.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Settings for the version manager.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root of installed versions and state. Defaults to the platform data
    /// directory.
    pub data_dir: Option<Utf8PathBuf>,
    /// Directory receiving the `nvim` launcher link. Defaults to
    /// `<data_dir>/bin`.
    pub launcher_dir: Option<Utf8PathBuf>,
    /// GitHub releases API endpoint.
    pub release_api_url: String,
    /// Git remote cloned for source builds.
    pub source_repo_url: String,
    /// Releases older than this are hidden. Empty disables the filter.
    pub min_version: String,
    /// Number of nightly backups retained for rollback.
    pub history_limit: usize,
    /// Release list cache lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Per-download network timeout in seconds.
    pub download_timeout_secs: u64,
    /// Longest wait for another invocation's lock, in seconds.
    pub lock_timeout_secs: u64,
    /// Deadline for a whole command in seconds. Zero means no deadline.
    pub operation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            launcher_dir: None,
            release_api_url: DEFAULT_RELEASE_API_URL.to_owned(),
            source_repo_url: DEFAULT_SOURCE_REPO_URL.to_owned(),
            min_version: DEFAULT_MIN_VERSION.to_owned(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            cache_ttl_secs: 300,
            download_timeout_secs: 600,
            lock_timeout_secs: 120,
            operation_timeout_secs: 0,
        }
    }
}

impl Config {
    /// Load the configuration from `$NVUP_CONFIG` or the platform config
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] when the file exists but cannot be
    /// read, parsed, or validated.
    pub fn load(dirs: &dyn BaseDirs) -> Result<Self> {
        match config_path(dirs) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load the configuration from `path`; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] when the file cannot be read,
    /// parsed, or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no configuration at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(config_error(path, err)),
        };
        let config: Self = toml::from_str(&contents).map_err(|err| config_error(path, err))?;
        config.validate().map_err(|reason| config_error(path, reason))?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.history_limit == 0 {
            return Err("history_limit must be at least 1".to_owned());
        }
        self.parsed_min_version().map(|_| ())
    }

    fn parsed_min_version(&self) -> std::result::Result<Option<Version>, String> {
        let raw = self.min_version.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let bare = raw.strip_prefix('v').unwrap_or(raw);
        Version::parse(bare)
            .map(Some)
            .map_err(|err| format!("min_version {raw:?} is not a semantic version: {err}"))
    }

    /// The minimum release version, or `None` when filtering is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] for a malformed version.
    pub fn min_version(&self) -> Result<Option<Version>> {
        self.parsed_min_version()
            .map_err(|reason| config_error(Path::new(CONFIG_FILE), reason))
    }

    /// Release list cache lifetime.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Per-download network timeout.
    #[must_use]
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Longest wait for a contended lock.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// A token for one command, expiring after `operation_timeout_secs`.
    #[must_use]
    pub fn operation_token(&self) -> CancelToken {
        match self.operation_timeout_secs {
            0 => CancelToken::new(),
            secs => CancelToken::with_timeout(Duration::from_secs(secs)),
        }
    }

    /// Resolve the on-disk layout, expanding `~` and filling defaults.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] when no data directory can be
    /// determined or a path is not valid UTF-8.
    pub fn layout(&self, dirs: &dyn BaseDirs) -> Result<Layout> {
        let data_dir = match &self.data_dir {
            Some(dir) => expand_home(dir, dirs)?,
            None => {
                let dir = dirs.data_dir().ok_or_else(|| {
                    config_error(
                        Path::new(CONFIG_FILE),
                        "could not determine a data directory; set data_dir",
                    )
                })?;
                utf8(dir)?
            }
        };
        let launcher_dir = match &self.launcher_dir {
            Some(dir) => expand_home(dir, dirs)?,
            None => data_dir.join("bin"),
        };
        Ok(Layout::new(data_dir, launcher_dir))
    }
}

/// Where the configuration is read from: `$NVUP_CONFIG`, else
/// `<config_dir>/config.toml`.
#[must_use]
pub fn config_path(dirs: &dyn BaseDirs) -> Option<PathBuf> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => dirs.config_dir().map(|dir| dir.join(CONFIG_FILE)),
    }
}

fn expand_home(path: &Utf8PathBuf, dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    let Some(rest) = path.as_str().strip_prefix('~') else {
        return Ok(path.clone());
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
        return Ok(path.clone());
    }
    let home = dirs.home_dir().ok_or_else(|| {
        config_error(
            Path::new(CONFIG_FILE),
            format!("cannot expand {path}: no home directory"),
        )
    })?;
    let home = utf8(home)?;
    let rest = rest.trim_start_matches(['/', '\\']);
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

fn utf8(path: PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::try_from(path).map_err(|err| {
        let path = err.as_path().to_path_buf();
        config_error(&path, "path is not valid UTF-8")
    })
}

fn config_error(path: &Path, reason: impl ToString) -> InstallerError {
    InstallerError::Config {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirs::MockBaseDirs;
    use rstest::rstest;

    fn mock_dirs(root: &Path) -> MockBaseDirs {
        let mut dirs = MockBaseDirs::new();
        let home = root.to_path_buf();
        dirs.expect_home_dir().returning(move || Some(home.clone()));
        let config = root.join(".config/nvup");
        dirs.expect_config_dir()
            .returning(move || Some(config.clone()));
        let data = root.join(".local/share/nvup");
        dirs.expect_data_dir().returning(move || Some(data.clone()));
        dirs
    }

    #[rstest]
    fn defaults_are_complete() {
        let config = Config::default();

        assert_eq!(config.history_limit, 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(
            config.min_version().expect("version"),
            Some(Version::new(0, 5, 0))
        );
    }

    #[rstest]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().expect("temp dir");
        let config = Config::load_from(&temp.path().join("config.toml")).expect("load");
        assert_eq!(config, Config::default());
    }

    #[rstest]
    fn overrides_are_read_from_toml() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "history_limit = 2\nmin_version = \"v0.9.0\"\n").expect("write");

        let config = Config::load_from(&path).expect("load");

        assert_eq!(config.history_limit, 2);
        assert_eq!(
            config.min_version().expect("version"),
            Some(Version::new(0, 9, 0))
        );
        assert_eq!(config.release_api_url, DEFAULT_RELEASE_API_URL);
    }

    #[rstest]
    fn operation_token_has_no_deadline_by_default() {
        let token = Config::default().operation_token();

        assert_eq!(token.remaining(), None);
        assert!(token.check().is_ok());
    }

    #[rstest]
    fn operation_timeout_sets_a_deadline() {
        let config = Config {
            operation_timeout_secs: 30,
            ..Config::default()
        };

        let remaining = config.operation_token().remaining().expect("deadline");

        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(20));
    }

    #[rstest]
    #[case::unknown_key("histroy_limit = 2\n")]
    #[case::zero_limit("history_limit = 0\n")]
    #[case::bad_version("min_version = \"latest\"\n")]
    #[case::wrong_type("cache_ttl_secs = \"soon\"\n")]
    fn invalid_files_are_config_errors(#[case] contents: &str) {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, contents).expect("write");

        let err = Config::load_from(&path).expect_err("invalid");

        assert!(matches!(err, InstallerError::Config { .. }), "got {err}");
    }

    #[test]
    fn empty_min_version_disables_filtering() {
        let config = Config {
            min_version: String::new(),
            ..Config::default()
        };
        assert_eq!(config.min_version().expect("version"), None);
    }

    #[test]
    fn layout_defaults_to_platform_data_dir() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = mock_dirs(temp.path());

        let layout = Config::default().layout(&dirs).expect("layout");

        let data = Utf8PathBuf::try_from(temp.path().join(".local/share/nvup")).expect("utf8");
        assert_eq!(layout.data_dir(), data.as_path());
        assert_eq!(layout.launcher_dir(), data.join("bin").as_path());
    }

    #[test]
    fn layout_expands_home_prefix() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = mock_dirs(temp.path());
        let config = Config {
            launcher_dir: Some(Utf8PathBuf::from("~/.local/bin")),
            ..Config::default()
        };

        let layout = config.layout(&dirs).expect("layout");

        let home = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
        assert_eq!(layout.launcher_dir(), home.join(".local/bin").as_path());
    }

    #[test]
    fn config_path_prefers_environment_override() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dirs = mock_dirs(temp.path());
        let explicit = temp.path().join("elsewhere.toml");

        temp_env::with_var(CONFIG_ENV, Some(explicit.as_os_str()), || {
            assert_eq!(config_path(&dirs), Some(explicit.clone()));
        });
        temp_env::with_var_unset(CONFIG_ENV, || {
            assert_eq!(
                config_path(&dirs),
                Some(temp.path().join(".config/nvup/config.toml"))
            );
        });
    }
}
