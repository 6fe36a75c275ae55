//! Asset selection for the host platform.
//!
//! Upstream has renamed its release assets several times, so each supported
//! (OS, architecture) pair carries an ordered list of file-name fragments,
//! newest naming first. The first fragment found in any asset name wins.

use super::Release;
use crate::error::{InstallerError, Result};

/// Suffix of the per-asset checksum file.
pub const CHECKSUM_SUFFIX: &str = ".sha256sum";

/// Name of the combined checksum file published by newer releases.
pub const COMBINED_CHECKSUM_ASSET: &str = "shasum.txt";

/// Ordered asset name fragments for each supported platform.
const ASSET_PATTERNS: &[(&str, &str, &[&str])] = &[
    (
        "linux",
        "x86_64",
        &["nvim-linux-x86_64.tar.gz", "nvim-linux64.tar.gz"],
    ),
    ("linux", "aarch64", &["nvim-linux-arm64.tar.gz"]),
    (
        "macos",
        "aarch64",
        &["nvim-macos-arm64.tar.gz", "nvim-macos.tar.gz"],
    ),
    (
        "macos",
        "x86_64",
        &["nvim-macos-x86_64.tar.gz", "nvim-macos.tar.gz"],
    ),
    ("windows", "x86_64", &["nvim-win64.zip"]),
    ("windows", "aarch64", &["nvim-win-arm64.zip"]),
];

/// Operating system and CPU architecture, as named by `std::env::consts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    /// Operating system, e.g. `linux`.
    pub os: String,
    /// Architecture, e.g. `x86_64`.
    pub arch: String,
}

impl Platform {
    /// Construct a platform from explicit identifiers.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this binary was compiled for.
    #[must_use]
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Ordered asset name fragments for this platform.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::UnsupportedPlatform`] when no release asset
    /// is ever published for this platform.
    pub fn asset_patterns(&self) -> Result<&'static [&'static str]> {
        ASSET_PATTERNS
            .iter()
            .find(|(os, arch, _)| *os == self.os && *arch == self.arch)
            .map(|(_, _, patterns)| *patterns)
            .ok_or_else(|| InstallerError::UnsupportedPlatform {
                os: self.os.clone(),
                arch: self.arch.clone(),
            })
    }
}

/// The asset chosen for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMatch {
    /// Asset file name.
    pub name: String,
    /// Download URL.
    pub download_url: String,
    /// The fragment that matched; used to locate the checksum asset.
    pub pattern: &'static str,
}

/// Pick the release asset for `platform`.
///
/// # Errors
///
/// Returns [`InstallerError::UnsupportedPlatform`] for unknown platforms and
/// [`InstallerError::NoAssetForPlatform`] when the release carries nothing
/// matching.
pub fn asset_for(release: &Release, platform: &Platform) -> Result<AssetMatch> {
    let patterns = platform.asset_patterns()?;
    patterns
        .iter()
        .find_map(|&pattern| {
            release
                .assets
                .iter()
                .filter(|asset| !asset.name.ends_with(CHECKSUM_SUFFIX))
                .find(|asset| asset.name.contains(pattern))
                .map(|asset| AssetMatch {
                    name: asset.name.clone(),
                    download_url: asset.download_url.clone(),
                    pattern,
                })
        })
        .ok_or_else(|| InstallerError::NoAssetForPlatform {
            tag: release.tag.clone(),
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        })
}

/// URL of the checksum published for the asset matched by `pattern`.
///
/// Prefers `<pattern>.sha256sum` and falls back to the combined
/// `shasum.txt`. `None` means the release publishes no checksum.
#[must_use]
pub fn checksum_for(release: &Release, pattern: &str) -> Option<String> {
    let per_asset = format!("{pattern}{CHECKSUM_SUFFIX}");
    let find = |name: &str| {
        release
            .assets
            .iter()
            .find(|asset| asset.name == name)
            .map(|asset| asset.download_url.clone())
    };
    find(&per_asset).or_else(|| find(COMBINED_CHECKSUM_ASSET))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Asset;
    use rstest::rstest;

    fn release_with(names: &[&str]) -> Release {
        Release {
            tag: "v0.10.0".to_owned(),
            is_prerelease: false,
            assets: names
                .iter()
                .map(|name| Asset {
                    name: (*name).to_owned(),
                    download_url: format!("https://example.test/{name}"),
                    size: 1,
                })
                .collect(),
            published_at: None,
            source_commit: None,
        }
    }

    #[rstest]
    #[case::linux_new("linux", "x86_64", "nvim-linux-x86_64.tar.gz")]
    #[case::mac_arm("macos", "aarch64", "nvim-macos-arm64.tar.gz")]
    #[case::windows("windows", "x86_64", "nvim-win64.zip")]
    fn picks_the_platform_asset(#[case] os: &str, #[case] arch: &str, #[case] expected: &str) {
        let release = release_with(&[
            "nvim-linux-x86_64.tar.gz",
            "nvim-linux-x86_64.tar.gz.sha256sum",
            "nvim-macos-arm64.tar.gz",
            "nvim-macos-x86_64.tar.gz",
            "nvim-win64.zip",
        ]);

        let chosen = asset_for(&release, &Platform::new(os, arch)).expect("asset");

        assert_eq!(chosen.name, expected);
        assert_eq!(chosen.download_url, format!("https://example.test/{expected}"));
    }

    #[test]
    fn falls_back_to_legacy_asset_names() {
        let release = release_with(&["nvim-linux64.tar.gz", "nvim-macos.tar.gz"]);

        let linux = asset_for(&release, &Platform::new("linux", "x86_64")).expect("linux");
        let mac = asset_for(&release, &Platform::new("macos", "aarch64")).expect("mac");

        assert_eq!(linux.pattern, "nvim-linux64.tar.gz");
        assert_eq!(mac.name, "nvim-macos.tar.gz");
    }

    #[test]
    fn checksum_assets_never_match_as_payload() {
        let release = release_with(&["nvim-linux64.tar.gz.sha256sum"]);
        let err = asset_for(&release, &Platform::new("linux", "x86_64")).expect_err("no asset");
        assert!(matches!(err, InstallerError::NoAssetForPlatform { .. }));
    }

    #[test]
    fn unknown_platform_is_distinct_from_missing_asset() {
        let release = release_with(&["nvim-linux64.tar.gz"]);
        let err = asset_for(&release, &Platform::new("freebsd", "x86_64")).expect_err("platform");
        assert!(matches!(err, InstallerError::UnsupportedPlatform { .. }));
    }

    #[rstest]
    #[case::per_asset(
        &["nvim-linux64.tar.gz", "nvim-linux64.tar.gz.sha256sum", "shasum.txt"],
        Some("https://example.test/nvim-linux64.tar.gz.sha256sum")
    )]
    #[case::combined(
        &["nvim-linux64.tar.gz", "shasum.txt"],
        Some("https://example.test/shasum.txt")
    )]
    #[case::absent(&["nvim-linux64.tar.gz"], None)]
    fn checksum_lookup(#[case] names: &[&str], #[case] expected: Option<&str>) {
        let release = release_with(names);
        assert_eq!(
            checksum_for(&release, "nvim-linux64.tar.gz").as_deref(),
            expected
        );
    }
}
