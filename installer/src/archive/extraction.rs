//! Archive extraction for downloaded editor releases.
//!
//! Both containers are materialised in archive order: directories, regular
//! files with their permission bits, and symbolic links with the target copied
//! verbatim. Entry paths are validated before anything is written so an entry
//! cannot escape the destination (zip-slip). Callers always extract into a
//! disposable staging directory; a failed extraction leaves partial output
//! there and nowhere else.

use super::error::ArchiveError;
use super::format::{ArchiveFormat, detect_format};
use flate2::read::GzDecoder;
use log::{debug, trace};
use nvup_common::CancelToken;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Component, Path};

/// File type bits of a Unix mode.
const S_IFMT: u32 = 0o170_000;
/// Symbolic link file type.
const S_IFLNK: u32 = 0o120_000;

/// What an extraction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// The detected container.
    pub format: ArchiveFormat,
    /// Number of entries materialised.
    pub entries: usize,
}

/// Trait for extracting release archives, enabling test mocking.
///
/// # Examples
///
/// ```
/// use nvup_installer::archive::ArchiveCodec;
///
/// let extractor = ArchiveCodec;
/// // Use extractor.extract(archive_path, dest_dir, &cancel) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::EmptyInput`] or
    /// [`ArchiveError::UnsupportedFormat`] when the container is not
    /// recognised, [`ArchiveError::PathTraversal`] when an entry would escape
    /// `dest_dir`, and [`ArchiveError::Cancelled`] when `cancel` fires between
    /// entries.
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<ExtractionSummary, ArchiveError>;
}

/// Default extractor: sniffs the container and dispatches to `tar`+`flate2`
/// or `zip`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveCodec;

impl ArchiveExtractor for ArchiveCodec {
    fn extract(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<ExtractionSummary, ArchiveError> {
        let file = File::open(archive_path)?;
        extract(BufReader::new(file), dest_dir, cancel)
    }
}

/// Detect the container of `reader` and extract every entry into `dest_dir`.
///
/// # Errors
///
/// See [`ArchiveExtractor::extract`].
pub fn extract<R: Read + Seek>(
    mut reader: R,
    dest_dir: &Path,
    cancel: &CancelToken,
) -> Result<ExtractionSummary, ArchiveError> {
    let format = detect_format(&mut reader)?;
    fs::create_dir_all(dest_dir).map_err(|source| ArchiveError::Entry {
        path: dest_dir.to_path_buf(),
        source,
    })?;

    debug!("extracting {format} archive into {}", dest_dir.display());
    let entries = match format {
        ArchiveFormat::TarGz => extract_tar_gz(reader, dest_dir, cancel)?,
        ArchiveFormat::Zip => extract_zip(reader, dest_dir, cancel)?,
    };
    debug!("extracted {entries} entries");
    Ok(ExtractionSummary { format, entries })
}

fn extract_tar_gz<R: Read>(
    reader: R,
    dest_dir: &Path,
    cancel: &CancelToken,
) -> Result<usize, ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_overwrite(true);
    archive.set_preserve_mtime(true);

    let mut count = 0;
    for entry_result in archive.entries().map_err(ArchiveError::corrupt)? {
        cancel.check()?;
        let mut entry = entry_result.map_err(ArchiveError::corrupt)?;
        let entry_path = entry.path().map_err(ArchiveError::corrupt)?.into_owned();
        validate_entry_path(&entry_path)?;
        trace!("tar entry {}", entry_path.display());

        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|source| ArchiveError::Entry {
                path: dest_dir.join(&entry_path),
                source,
            })?;
        if !unpacked {
            return Err(ArchiveError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }
        count += 1;
    }
    Ok(count)
}

fn extract_zip<R: Read + Seek>(
    reader: R,
    dest_dir: &Path,
    cancel: &CancelToken,
) -> Result<usize, ArchiveError> {
    let mut archive = zip::ZipArchive::new(reader).map_err(ArchiveError::corrupt)?;

    for index in 0..archive.len() {
        cancel.check()?;
        let mut file = archive.by_index(index).map_err(ArchiveError::corrupt)?;
        let raw_name = file.name().to_owned();
        validate_entry_path(Path::new(&raw_name))?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| ArchiveError::PathTraversal {
                path: raw_name.clone(),
            })?;
        let dest_path = dest_dir.join(&relative);
        trace!("zip entry {raw_name}");

        let entry_err = |source: io::Error| ArchiveError::Entry {
            path: dest_path.clone(),
            source,
        };
        if file.is_dir() {
            fs::create_dir_all(&dest_path).map_err(entry_err)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(entry_err)?;
        }

        let mode = file.unix_mode();
        if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
            let mut target = String::new();
            file.read_to_string(&mut target).map_err(entry_err)?;
            write_symlink(&target, &dest_path).map_err(entry_err)?;
            continue;
        }

        let mut out = File::create(&dest_path).map_err(entry_err)?;
        io::copy(&mut file, &mut out).map_err(entry_err)?;
        drop(out);
        if let Some(mode) = mode {
            apply_mode(&dest_path, mode).map_err(entry_err)?;
        }
    }
    Ok(archive.len())
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ArchiveError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ArchiveError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

fn write_symlink(target: &str, link: &Path) -> io::Result<()> {
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = target;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "extraction_tests.rs"]
mod tests;
