//! Install pipeline orchestration.
//!
//! Installs one version through the stages
//! `download → verify → detect format → extract → commit → write identifier`.
//! The archive is streamed into a private temporary file and unpacked into a
//! staging directory created inside the versions directory, so the commit is
//! a single same-filesystem rename performed under the version's advisory
//! lock. Anything that fails before the commit leaves the final directory
//! untouched; temporary downloads and staging trees are always removed.

use crate::archive::{ArchiveError, ArchiveExtractor};
use crate::checksum::{expected_digest, sha256_file};
use crate::download::{DownloadError, Downloader};
use crate::error::{InstallerError, Result};
use crate::layout::{IDENTIFIER_FILE, Layout, validate_version_name};
use crate::progress::{Phase, ProgressFn, ProgressReporter};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use nvup_common::{AdvisoryLock, CancelToken, write_atomic};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Pipeline stage, carried by failures so callers can report where an
/// install stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Streaming the archive to a temporary file.
    Download,
    /// Comparing the archive against its published digest.
    Verify,
    /// Recognising the archive container.
    DetectFormat,
    /// Unpacking into the staging directory.
    Extract,
    /// Renaming the staged tree into place.
    Commit,
    /// Recording the installed identifier.
    WriteIdentifier,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Download => "download",
            Self::Verify => "verify",
            Self::DetectFormat => "format detection",
            Self::Extract => "extract",
            Self::Commit => "commit",
            Self::WriteIdentifier => "identifier write",
        };
        f.write_str(label)
    }
}

/// What to do when the final version directory already exists.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExistingVersion {
    /// Fail with [`InstallerError::VersionExists`].
    #[default]
    Reject,
    /// Replace the existing directory.
    Replace,
    /// Move the existing directory to this path first; if the path is
    /// already occupied, the existing directory is discarded instead.
    BackUpTo(Utf8PathBuf),
}

/// Everything the pipeline needs to install one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Directory name under `versions/`.
    pub name: String,
    /// Archive download URL.
    pub asset_url: String,
    /// Archive file name, used to pick the line in a combined checksum file.
    pub asset_name: String,
    /// Checksum file URL; `None` skips verification.
    pub checksum_url: Option<String>,
    /// Value written to the identifier marker after commit.
    pub identifier: String,
    /// Policy for an existing directory of the same name.
    pub existing: ExistingVersion,
}

/// Runs install requests against a layout.
pub struct InstallPipeline<'a> {
    layout: &'a Layout,
    downloader: &'a dyn Downloader,
    extractor: &'a dyn ArchiveExtractor,
    lock_timeout: Duration,
}

impl<'a> InstallPipeline<'a> {
    /// A pipeline writing into `layout`.
    #[must_use]
    pub fn new(
        layout: &'a Layout,
        downloader: &'a dyn Downloader,
        extractor: &'a dyn ArchiveExtractor,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            layout,
            downloader,
            extractor,
            lock_timeout,
        }
    }

    /// Install `request`, returning the committed version directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Install`] naming the version and the stage
    /// that failed. [`InstallerError::InvalidVersionName`] is returned
    /// unwrapped before any work starts.
    pub fn install(
        &self,
        request: &InstallRequest,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<Utf8PathBuf> {
        validate_version_name(&request.name)?;
        let name = request.name.as_str();
        let mut progress = ProgressReporter::new(on_progress);
        info!("installing {name} from {}", request.asset_url);

        let versions_dir = self
            .layout
            .ensure_versions_dir()
            .map_err(|e| e.during(name, Stage::Download))?;

        let archive = self
            .download(request, cancel, &mut progress)
            .map_err(|e| e.during(name, Stage::Download))?;

        self.verify(request, archive.path(), cancel, &mut progress)
            .map_err(|e| e.during(name, Stage::Verify))?;

        progress.phase(Phase::Extracting);
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&versions_dir)
            .map_err(|source| {
                InstallerError::fs("create staging directory in", &versions_dir, source)
                    .during(name, Stage::Extract)
            })?;
        self.extractor
            .extract(archive.path(), staging.path(), cancel)
            .map_err(|err| {
                let stage = match err {
                    ArchiveError::EmptyInput | ArchiveError::UnsupportedFormat { .. } => {
                        Stage::DetectFormat
                    }
                    _ => Stage::Extract,
                };
                InstallerError::from(err).during(name, stage)
            })?;
        drop(archive);

        progress.phase(Phase::Committing);
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        let committed = commit_staged(
            self.layout,
            name,
            staging.path(),
            &request.existing,
            &request.identifier,
            &lock_cancel,
        )
        .map_err(|e| e.during(name, Stage::Commit))?;
        // The staged tree now lives at the final path; dropping the guard
        // only finds an empty path.
        drop(staging);

        write_identifier(committed.path(), &request.identifier)
            .map_err(|e| e.during(name, Stage::WriteIdentifier))?;
        let final_dir = committed.release();

        progress.phase(Phase::Done);
        info!("installed {name} at {final_dir}");
        Ok(final_dir)
    }

    fn download(
        &self,
        request: &InstallRequest,
        cancel: &CancelToken,
        progress: &mut ProgressReporter<'_, '_>,
    ) -> Result<NamedTempFile> {
        let downloads = self.layout.downloads_dir();
        fs::create_dir_all(&downloads)
            .map_err(|source| InstallerError::fs("create", &downloads, source))?;
        let mut archive = tempfile::Builder::new()
            .prefix(".nvup-")
            .suffix(&format!("-{}", request.asset_name))
            .tempfile_in(&downloads)
            .map_err(|source| InstallerError::fs("create temporary file in", &downloads, source))?;

        progress.phase(Phase::Downloading);
        let bytes = self.downloader.fetch_to_writer(
            &request.asset_url,
            archive.as_file_mut(),
            cancel,
            &mut |done, total| progress.bytes(done, total),
        )?;
        debug!("downloaded {bytes} bytes to {}", archive.path().display());
        Ok(archive)
    }

    fn verify(
        &self,
        request: &InstallRequest,
        archive: &Path,
        cancel: &CancelToken,
        progress: &mut ProgressReporter<'_, '_>,
    ) -> Result<()> {
        let Some(url) = request.checksum_url.as_deref() else {
            warn!(
                "no checksum published for {}; skipping verification",
                request.asset_name
            );
            progress.phase(Phase::VerificationSkipped);
            return Ok(());
        };

        progress.phase(Phase::Verifying);
        let text = self
            .downloader
            .fetch_text(url, cancel)
            .map_err(|err| match err {
                DownloadError::Cancelled(cancelled) => InstallerError::Cancelled(cancelled),
                other => InstallerError::ChecksumUnavailable {
                    asset: request.asset_name.clone(),
                    url: url.to_owned(),
                    reason: other.to_string(),
                },
            })?;
        let expected = expected_digest(&text, &request.asset_name)?;
        let actual =
            sha256_file(archive).map_err(|source| InstallerError::fs("read", archive, source))?;
        if expected != actual {
            return Err(InstallerError::ChecksumMismatch {
                asset: request.asset_name.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        debug!("checksum verified for {}", request.asset_name);
        Ok(())
    }
}

/// A committed version directory whose advisory lock is still held.
///
/// Callers finish writing metadata into [`Self::path`] before calling
/// [`Self::release`], so other invocations never observe a committed tree
/// without its identifier.
#[derive(Debug)]
pub struct CommittedVersion {
    path: Utf8PathBuf,
    _lock: AdvisoryLock,
}

impl CommittedVersion {
    /// The final version directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Release the lock and return the directory.
    #[must_use]
    pub fn release(self) -> Utf8PathBuf {
        self.path
    }
}

/// Rename a fully populated `staged` directory into place as version `name`.
///
/// Runs under the advisory lock of the final directory (and of the backup
/// path for [`ExistingVersion::BackUpTo`]). The version lock stays held by
/// the returned [`CommittedVersion`]. `staged` must live on the same
/// filesystem as the versions directory. Source builds use this to commit
/// their install prefix.
///
/// An existing directory already recording `identifier` is left alone, since
/// another invocation committed the same content while this one was
/// staging.
///
/// # Errors
///
/// Returns [`InstallerError::VersionExists`] under
/// [`ExistingVersion::Reject`] or when the existing directory already
/// records `identifier`, [`InstallerError::Lock`] when a lock cannot
/// be taken before `cancel` expires, and [`InstallerError::Filesystem`] when a
/// rename fails. On a failed rename the previous directory is restored.
pub fn commit_staged(
    layout: &Layout,
    name: &str,
    staged: &Path,
    existing: &ExistingVersion,
    identifier: &str,
    cancel: &CancelToken,
) -> Result<CommittedVersion> {
    validate_version_name(name)?;
    let final_dir = layout.version_dir(name);
    let lock = AdvisoryLock::acquire(final_dir.as_std_path(), cancel)?;

    if !exists(&final_dir) {
        rename(staged, final_dir.as_std_path())?;
        debug!("committed {name}");
        return Ok(CommittedVersion {
            path: final_dir,
            _lock: lock,
        });
    }

    let identical = layout.read_identifier(name)?.as_deref() == Some(identifier);
    match existing {
        _ if identical => {
            debug!("{name} already records {identifier}; keeping it");
            return Err(InstallerError::VersionExists {
                name: name.to_owned(),
                path: final_dir.into_std_path_buf(),
            });
        }
        ExistingVersion::Reject => {
            return Err(InstallerError::VersionExists {
                name: name.to_owned(),
                path: final_dir.into_std_path_buf(),
            });
        }
        ExistingVersion::Replace => swap_in(staged, &final_dir)?,
        ExistingVersion::BackUpTo(backup) => {
            let _backup_lock = AdvisoryLock::acquire(backup.as_std_path(), cancel)?;
            if exists(backup) {
                debug!("backup {backup} already present; discarding active {name}");
                swap_in(staged, &final_dir)?;
            } else {
                rename(final_dir.as_std_path(), backup.as_std_path())?;
                if let Err(err) = rename(staged, final_dir.as_std_path()) {
                    let _ = fs::rename(backup, &final_dir);
                    return Err(err);
                }
                info!("preserved previous {name} as {backup}");
            }
        }
    }
    debug!("committed {name}");
    Ok(CommittedVersion {
        path: final_dir,
        _lock: lock,
    })
}

/// Replace `final_dir` with `staged`, restoring the old tree on failure.
fn swap_in(staged: &Path, final_dir: &Utf8Path) -> Result<()> {
    let retired = retired_path(final_dir);
    rename(final_dir.as_std_path(), retired.as_std_path())?;
    if let Err(err) = rename(staged, final_dir.as_std_path()) {
        let _ = fs::rename(&retired, final_dir);
        return Err(err);
    }
    remove_tree(&retired);
    Ok(())
}

/// A hidden sibling name for a directory about to be deleted.
pub(crate) fn retired_path(dir: &Utf8Path) -> Utf8PathBuf {
    let name = dir.file_name().unwrap_or("version");
    dir.with_file_name(format!(".retired-{name}-{}", std::process::id()))
}

/// Delete a retired tree; leftovers are hidden and harmless.
pub(crate) fn remove_tree(dir: &Utf8Path) {
    if let Err(err) = fs::remove_dir_all(dir) {
        warn!("could not remove {dir}: {err}");
    }
}

pub(crate) fn write_identifier(final_dir: &Utf8Path, identifier: &str) -> Result<()> {
    let path = final_dir.join(IDENTIFIER_FILE);
    write_atomic(path.as_std_path(), identifier.as_bytes())
        .map_err(|source| InstallerError::fs("write", path, source))
}

fn exists(path: &Utf8Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|source| {
        InstallerError::fs(
            "rename",
            from,
            io::Error::new(source.kind(), format!("to {}: {source}", to.display())),
        )
    })
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
