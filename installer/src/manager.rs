//! The version manager facade used by the command layer.
//!
//! [`VersionManager`] wires configuration, the release resolver, the install
//! pipeline, the switch engine, and the nightly history together. Commands
//! call one method each; every method re-derives state from disk.

use crate::archive::ArchiveExtractor;
use crate::config::Config;
use crate::download::Downloader;
use crate::error::{InstallerError, Result};
use crate::history::{HistoryEntry, HistoryStore, short_hash};
use crate::layout::{CURRENT_LINK, Layout, validate_version_name};
use crate::pipeline::{
    ExistingVersion, InstallPipeline, InstallRequest, Stage, commit_staged, remove_tree,
    retired_path, write_identifier,
};
use crate::progress::{Phase, ProgressFn, ProgressReporter};
use crate::release::{
    Alias, NIGHTLY_TAG, Platform, Release, ReleaseCache, ReleaseResolver, ReleaseSource,
    SHORT_HASH_LEN, asset_for, checksum_for, is_hex, is_sentinel_tag, normalize_tag,
    resolve_alias,
};
use crate::rollback::{Rollback, RollbackOutcome};
use crate::source_build::SourceBuilder;
use crate::switch::SwitchEngine;
use log::{debug, info};
use nvup_common::{AdvisoryLock, CancelToken};
use semver::Version;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Result of an install or upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A new tree was committed.
    Installed {
        /// Installed directory name.
        name: String,
        /// Identifier recorded for it.
        identifier: String,
        /// Whether `current` now points at it.
        activated: bool,
    },
    /// The installed identifier already matches upstream.
    UpToDate {
        /// Installed directory name.
        name: String,
    },
}

impl InstallOutcome {
    /// The installed directory name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Installed { name, .. } | Self::UpToDate { name } => name,
        }
    }
}

/// Result of switching versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UseOutcome {
    /// `current` now points at `name`.
    Switched {
        /// The active version.
        name: String,
        /// The binary behind the launcher.
        binary: PathBuf,
    },
    /// `name` was already active; nothing changed.
    AlreadyActive {
        /// The active version.
        name: String,
    },
}

/// One installed version as reported by [`VersionManager::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledVersion {
    /// Directory name.
    pub name: String,
    /// Recorded identifier, if the marker is present.
    pub identifier: Option<String>,
    /// Whether `current` points here.
    pub active: bool,
}

/// External collaborators the manager drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Upstream release list.
    pub releases: &'a dyn ReleaseSource,
    /// Archive and checksum downloads.
    pub downloader: &'a dyn Downloader,
    /// Archive unpacking.
    pub extractor: &'a dyn ArchiveExtractor,
    /// Source builds for commit aliases.
    pub builder: &'a dyn SourceBuilder,
}

/// Installs, switches, removes, and rolls back editor versions.
pub struct VersionManager<'a> {
    layout: Layout,
    collaborators: Collaborators<'a>,
    platform: Platform,
    min_version: Option<Version>,
    cache_ttl: Duration,
    history_limit: usize,
    lock_timeout: Duration,
}

impl<'a> VersionManager<'a> {
    /// A manager for `layout` configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Config`] when `config` carries an invalid
    /// minimum version.
    pub fn new(layout: Layout, config: &Config, collaborators: Collaborators<'a>) -> Result<Self> {
        Ok(Self {
            layout,
            collaborators,
            platform: Platform::current(),
            min_version: config.min_version()?,
            cache_ttl: config.cache_ttl(),
            history_limit: config.history_limit,
            lock_timeout: config.lock_timeout(),
        })
    }

    /// Select assets for `platform` instead of the host.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The on-disk layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn resolver(&self) -> ReleaseResolver<'a> {
        ReleaseResolver::new(
            self.collaborators.releases,
            ReleaseCache::new(self.layout.cache_file(), self.cache_ttl),
            self.min_version.clone(),
        )
    }

    fn switch(&self) -> SwitchEngine<'_> {
        SwitchEngine::new(&self.layout, self.lock_timeout)
    }

    fn history_store(&self) -> HistoryStore<'_> {
        HistoryStore::new(&self.layout, self.history_limit, self.lock_timeout)
    }

    /// Releases available upstream, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ReleaseList`] when the list cannot be
    /// fetched.
    pub fn available(&self, force_refresh: bool) -> Result<Vec<Release>> {
        self.resolver().get_releases(force_refresh)
    }

    /// Install `alias` unless the installed copy is already current.
    ///
    /// The first installed version becomes active.
    ///
    /// # Errors
    ///
    /// Returns resolution errors ([`InstallerError::AliasNotFound`],
    /// [`InstallerError::NoAssetForPlatform`]) or a stage-annotated
    /// [`InstallerError::Install`].
    pub fn install(
        &self,
        alias: &str,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<InstallOutcome> {
        let alias: Alias = alias.parse()?;
        self.install_alias(&alias, false, cancel, on_progress)
    }

    /// As [`Self::install`], but always refreshes the release list first.
    ///
    /// # Errors
    ///
    /// As for [`Self::install`].
    pub fn upgrade(
        &self,
        alias: &str,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<InstallOutcome> {
        let alias: Alias = alias.parse()?;
        self.install_alias(&alias, true, cancel, on_progress)
    }

    fn install_alias(
        &self,
        alias: &Alias,
        force_refresh: bool,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<InstallOutcome> {
        let outcome = if let Alias::Commit(reference) = alias {
            self.install_from_source(reference, cancel, on_progress)?
        } else {
            self.install_release(alias, force_refresh, cancel, on_progress)?
        };
        self.activate_after_install(outcome, cancel)
    }

    fn install_release(
        &self,
        alias: &Alias,
        force_refresh: bool,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<InstallOutcome> {
        let releases = self.resolver().get_releases(force_refresh)?;
        let mut release = resolve_alias(&releases, alias)?;
        if *alias == Alias::Stable {
            release = concrete_stable(&releases, release);
        }
        let name = if *alias == Alias::Nightly {
            NIGHTLY_TAG.to_owned()
        } else {
            release.tag.clone()
        };
        let identifier = release.identifier();

        let installed = self.layout.read_identifier(&name)?;
        if self.layout.is_installed(&name) && installed.as_deref() == Some(identifier.as_str()) {
            info!("{name} is up to date ({identifier})");
            return Ok(InstallOutcome::UpToDate { name });
        }

        let displaced = installed.filter(|id| name == NIGHTLY_TAG && is_commit_hash(id));
        let existing = if !self.layout.is_installed(&name) {
            ExistingVersion::Reject
        } else if let Some(commit) = &displaced {
            ExistingVersion::BackUpTo(self.layout.backup_dir(short_hash(commit)))
        } else {
            ExistingVersion::Replace
        };

        let asset = asset_for(release, &self.platform)?;
        let request = InstallRequest {
            name: name.clone(),
            checksum_url: checksum_for(release, asset.pattern),
            asset_url: asset.download_url,
            asset_name: asset.name,
            identifier: identifier.clone(),
            existing: existing.clone(),
        };
        let pipeline = InstallPipeline::new(
            &self.layout,
            self.collaborators.downloader,
            self.collaborators.extractor,
            self.lock_timeout,
        );
        match pipeline.install(&request, cancel, on_progress) {
            Ok(_) => {}
            Err(err) if self.installed_concurrently(&err, &name, &identifier)? => {
                return Ok(InstallOutcome::UpToDate { name });
            }
            Err(err) => return Err(err),
        }

        if let (ExistingVersion::BackUpTo(_), Some(commit)) = (&existing, displaced) {
            self.history_store().record(&commit, NIGHTLY_TAG, cancel)?;
        }
        Ok(InstallOutcome::Installed {
            name,
            identifier,
            activated: false,
        })
    }

    /// Another invocation committed the same content while this one was
    /// downloading.
    fn installed_concurrently(
        &self,
        err: &InstallerError,
        name: &str,
        identifier: &str,
    ) -> Result<bool> {
        if !matches!(err.root(), InstallerError::VersionExists { .. }) {
            return Ok(false);
        }
        Ok(self.layout.read_identifier(name)?.as_deref() == Some(identifier))
    }

    fn install_from_source(
        &self,
        reference: &str,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<InstallOutcome> {
        validate_version_name(reference)?;
        let name = reference.to_owned();
        let tracks_branch = !is_hex(reference);
        if self.layout.is_installed(&name) && !tracks_branch {
            info!("{name} is already built");
            return Ok(InstallOutcome::UpToDate { name });
        }

        let mut progress = ProgressReporter::new(on_progress);
        let versions_dir = self.layout.ensure_versions_dir()?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&versions_dir)
            .map_err(|source| {
                InstallerError::fs("create staging directory in", &versions_dir, source)
            })?;

        let built = self
            .collaborators
            .builder
            .build_from_commit(reference, staging.path(), cancel)?;
        if self.layout.read_identifier(&name)?.as_deref() == Some(built.commit.as_str()) {
            info!("{name} is already at {}", built.commit);
            return Ok(InstallOutcome::UpToDate { name });
        }

        progress.phase(Phase::Committing);
        let existing = if tracks_branch {
            ExistingVersion::Replace
        } else {
            ExistingVersion::Reject
        };
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        let committed = match commit_staged(
            &self.layout,
            &name,
            staging.path(),
            &existing,
            &built.commit,
            &lock_cancel,
        ) {
            Ok(committed) => committed,
            Err(err) if self.installed_concurrently(&err, &name, &built.commit)? => {
                return Ok(InstallOutcome::UpToDate { name });
            }
            Err(err) => return Err(err.during(&name, Stage::Commit)),
        };
        drop(staging);
        write_identifier(committed.path(), &built.commit)
            .map_err(|e| e.during(&name, Stage::WriteIdentifier))?;
        drop(committed);
        progress.phase(Phase::Done);

        Ok(InstallOutcome::Installed {
            name,
            identifier: built.commit,
            activated: false,
        })
    }

    /// Point `current` at a fresh install when nothing is active yet, and
    /// refresh the links when the active version was replaced in place.
    fn activate_after_install(
        &self,
        outcome: InstallOutcome,
        cancel: &CancelToken,
    ) -> Result<InstallOutcome> {
        let InstallOutcome::Installed {
            name, identifier, ..
        } = outcome
        else {
            return Ok(outcome);
        };
        let current = self.switch().current()?;
        let activated = match current.as_deref() {
            None => true,
            Some(active) => active == name || !self.layout.is_installed(active),
        };
        if activated {
            self.switch().point_to(&name, cancel)?;
        }
        Ok(InstallOutcome::Installed {
            name,
            identifier,
            activated,
        })
    }

    /// Make `version` the active version, installing it first if needed.
    ///
    /// `version` may name an installed directory (including a nightly
    /// backup) or any alias accepted by [`Self::install`].
    ///
    /// # Errors
    ///
    /// As for [`Self::install`], plus [`InstallerError::BinaryNotFound`]
    /// when the installed tree holds no editor binary.
    pub fn use_version(
        &self,
        version: &str,
        cancel: &CancelToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<UseOutcome> {
        let name = if self.is_installed_name(version) {
            version.to_owned()
        } else {
            let alias: Alias = version.parse()?;
            match &alias {
                Alias::Tag(tag) if self.layout.is_installed(tag) => tag.clone(),
                Alias::Nightly if self.layout.is_installed(NIGHTLY_TAG) => NIGHTLY_TAG.to_owned(),
                _ => {
                    let outcome = if let Alias::Commit(reference) = &alias {
                        self.install_from_source(reference, cancel, on_progress)?
                    } else {
                        self.install_release(&alias, false, cancel, on_progress)?
                    };
                    outcome.name().to_owned()
                }
            }
        };

        if self.switch().current()?.as_deref() == Some(name.as_str()) {
            debug!("{name} is already active");
            return Ok(UseOutcome::AlreadyActive { name });
        }
        let binary = self.switch().point_to(&name, cancel)?;
        Ok(UseOutcome::Switched { name, binary })
    }

    fn is_installed_name(&self, name: &str) -> bool {
        validate_version_name(name).is_ok() && self.layout.is_installed(name)
    }

    /// Name of the active version, if any.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the pointer is unreadable.
    pub fn current(&self) -> Result<Option<String>> {
        self.switch().current()
    }

    /// Remove installed version `version`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::VersionNotInstalled`],
    /// [`InstallerError::VersionInUse`] for the active version, or
    /// [`InstallerError::Lock`] when another invocation holds the version.
    pub fn uninstall(&self, version: &str, cancel: &CancelToken) -> Result<()> {
        let name = self.installed_name(version)?;
        let dir = self.layout.version_dir(&name);
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        // `point_to` re-links under this lock, so `current` is stable while
        // it is held.
        let lock = AdvisoryLock::acquire(dir.as_std_path(), &lock_cancel)?;
        if !dir.is_dir() {
            return Err(InstallerError::VersionNotInstalled { name });
        }
        if self.current()?.as_deref() == Some(name.as_str()) {
            return Err(InstallerError::VersionInUse { name });
        }
        let retired = retired_path(&dir);
        fs::rename(&dir, &retired).map_err(|source| InstallerError::fs("retire", &dir, source))?;
        drop(lock);
        remove_tree(&retired);

        if let Some(short) = name.strip_prefix(&format!("{NIGHTLY_TAG}-")) {
            self.history_store().forget(short)?;
        }
        info!("uninstalled {name}");
        Ok(())
    }

    fn installed_name(&self, version: &str) -> Result<String> {
        let version = version.trim();
        if self.is_installed_name(version) {
            return Ok(version.to_owned());
        }
        let tag = normalize_tag(version);
        if self.is_installed_name(&tag) {
            return Ok(tag);
        }
        Err(InstallerError::VersionNotInstalled {
            name: version.to_owned(),
        })
    }

    /// Installed versions, sorted with semantic versions newest first.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the versions directory
    /// cannot be read.
    pub fn list(&self) -> Result<Vec<InstalledVersion>> {
        let dir = self.layout.versions_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(InstallerError::fs("read", &dir, source)),
        };
        let current = self.current()?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| InstallerError::fs("read", &dir, source))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || name == CURRENT_LINK {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            versions.push(InstalledVersion {
                identifier: self.layout.read_identifier(&name)?,
                active: current.as_deref() == Some(name.as_str()),
                name,
            });
        }
        versions.sort_by(|a, b| version_order(&a.name, &b.name));
        Ok(versions)
    }

    /// Record `commit_hash` as a superseded nightly.
    ///
    /// # Errors
    ///
    /// See [`HistoryStore::record`].
    pub fn record_nightly(&self, commit_hash: &str, cancel: &CancelToken) -> Result<()> {
        self.history_store().record(commit_hash, NIGHTLY_TAG, cancel)
    }

    /// Preserved nightlies, most recent first.
    ///
    /// # Errors
    ///
    /// See [`HistoryStore::entries`].
    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.history_store().entries()
    }

    /// Restore history entry `index` as the active nightly.
    ///
    /// # Errors
    ///
    /// See [`Rollback::rollback_to`].
    pub fn rollback_to(&self, index: usize, cancel: &CancelToken) -> Result<RollbackOutcome> {
        let history = self.history_store();
        let switch = self.switch();
        Rollback::new(&self.layout, &history, &switch, self.lock_timeout).rollback_to(index, cancel)
    }
}

/// Map a resolved `stable` sentinel release onto the versioned release it
/// mirrors, so it installs under its real tag.
fn concrete_stable<'r>(releases: &'r [Release], resolved: &'r Release) -> &'r Release {
    if !resolved.is_sentinel() {
        return resolved;
    }
    let versioned = |r: &&Release| !r.is_prerelease && !is_sentinel_tag(&r.tag);
    let by_commit = resolved.commit_hash().and_then(|commit| {
        releases
            .iter()
            .filter(versioned)
            .find(|r| r.commit_hash() == Some(commit))
    });
    by_commit
        .or_else(|| releases.iter().find(versioned))
        .unwrap_or(resolved)
}

fn is_commit_hash(identifier: &str) -> bool {
    identifier.len() >= SHORT_HASH_LEN && is_hex(identifier)
}

/// Semantic versions first, newest first; everything else by name.
fn version_order(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |name: &str| Version::parse(name.strip_prefix('v').unwrap_or(name)).ok();
    match (parse(a), parse(b)) {
        (Some(va), Some(vb)) => vb.cmp(&va),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
