//! SHA-256 verification of downloaded archives.
//!
//! Upstream publishes digests in `sha256sum` format: one `<hex>  <name>` line
//! per file, either in a per-asset `.sha256sum` file or in a combined
//! `shasum.txt`. The expected digest is picked by asset name, with a
//! single-line file accepted regardless of the name it records.

use crate::error::{InstallerError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// A validated, lowercase, hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use nvup_installer::checksum::Sha256Digest;
///
/// let digest = Sha256Digest::parse(&"AB".repeat(32)).unwrap();
/// assert_eq!(digest.as_str(), "ab".repeat(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Validate and normalise a hex digest.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when `value` is not 64 hex
    /// characters.
    pub fn parse(value: &str) -> std::result::Result<Self, String> {
        if value.len() != DIGEST_HEX_LEN {
            return Err(format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            ));
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(format!("invalid hex character {bad:?}"));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Digest of everything `reader` yields.
///
/// # Errors
///
/// Returns any I/O error raised while reading.
pub fn sha256_reader(reader: &mut dyn Read) -> io::Result<Sha256Digest> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher)?;
    Ok(Sha256Digest(format!("{:x}", hasher.finalize())))
}

/// Digest of the file at `path`.
///
/// # Errors
///
/// Returns any I/O error raised while opening or reading the file.
pub fn sha256_file(path: &Path) -> io::Result<Sha256Digest> {
    let mut file = File::open(path)?;
    sha256_reader(&mut file)
}

/// Digest of an in-memory buffer.
#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> Sha256Digest {
    Sha256Digest(format!("{:x}", Sha256::digest(bytes)))
}

/// Pick the digest recorded for `asset_name` from a checksum file.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidChecksum`] when no line names the asset
/// (and the file is not a single-entry file) or the digest is malformed.
///
/// # Examples
///
/// ```
/// use nvup_installer::checksum::expected_digest;
///
/// let text = format!("{}  nvim-linux64.tar.gz\n", "0".repeat(64));
/// let digest = expected_digest(&text, "nvim-linux64.tar.gz").unwrap();
/// assert_eq!(digest.as_str(), "0".repeat(64));
/// ```
pub fn expected_digest(checksum_text: &str, asset_name: &str) -> Result<Sha256Digest> {
    let invalid = |reason: String| InstallerError::InvalidChecksum {
        asset: asset_name.to_owned(),
        reason,
    };

    let entries: Vec<(&str, Option<&str>)> = checksum_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut fields = line.split_whitespace();
            let hex = fields.next().unwrap_or_default();
            let name = fields.next().map(recorded_file_name);
            (hex, name)
        })
        .collect();

    let chosen = entries
        .iter()
        .find(|(_, name)| *name == Some(asset_name))
        .or_else(|| match entries.as_slice() {
            [only] => Some(only),
            _ => None,
        })
        .ok_or_else(|| invalid(format!("no entry for {asset_name}")))?;

    Sha256Digest::parse(chosen.0).map_err(invalid)
}

/// Strip the binary-mode marker and any directory prefix from a name field.
fn recorded_file_name(field: &str) -> &str {
    let field = field.strip_prefix('*').unwrap_or(field);
    field.rsplit(['/', '\\']).next().unwrap_or(field)
}
