//! Container detection from leading magic bytes.

use super::error::ArchiveError;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};

/// ZIP local file header signature.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Gzip member header: magic plus the deflate compression method.
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Bytes read from the front of a stream to classify it.
pub const SNIFF_LEN: usize = 4;

/// Supported archive containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// A ZIP archive (Windows releases).
    Zip,
    /// A gzip-compressed tarball (Linux and macOS releases).
    TarGz,
}

impl ArchiveFormat {
    /// Classify a stream from its leading bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::EmptyInput`] for an empty prefix and
    /// [`ArchiveError::UnsupportedFormat`] for anything unrecognised.
    ///
    /// # Examples
    ///
    /// ```
    /// use nvup_installer::archive::ArchiveFormat;
    ///
    /// let format = ArchiveFormat::from_prefix(&[0x1f, 0x8b, 0x08, 0x00]).unwrap();
    /// assert_eq!(format, ArchiveFormat::TarGz);
    /// ```
    pub fn from_prefix(prefix: &[u8]) -> Result<Self, ArchiveError> {
        if prefix.is_empty() {
            return Err(ArchiveError::EmptyInput);
        }
        if prefix.starts_with(&ZIP_MAGIC) {
            return Ok(Self::Zip);
        }
        if prefix.starts_with(&GZIP_MAGIC) {
            return Ok(Self::TarGz);
        }
        Err(ArchiveError::UnsupportedFormat {
            prefix: prefix.iter().map(|byte| format!("{byte:02x}")).collect(),
        })
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip => f.write_str("zip"),
            Self::TarGz => f.write_str("tar.gz"),
        }
    }
}

/// Sniff the container format and rewind the stream to where it started.
///
/// # Errors
///
/// Returns the classification errors of [`ArchiveFormat::from_prefix`] and
/// any I/O error from reading or seeking.
pub fn detect_format<R: Read + Seek>(reader: &mut R) -> Result<ArchiveFormat, ArchiveError> {
    let start = reader.stream_position()?;
    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    Read::take(&mut *reader, SNIFF_LEN as u64).read_to_end(&mut prefix)?;
    reader.seek(SeekFrom::Start(start))?;
    ArchiveFormat::from_prefix(&prefix)
}
