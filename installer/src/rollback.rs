//! Rolling the active nightly back (or forward) to a preserved build.

use crate::error::{InstallerError, Result};
use crate::history::{HistoryEntry, HistoryStore, short_hash};
use crate::layout::Layout;
use crate::pipeline::{remove_tree, retired_path};
use crate::release::{NIGHTLY_TAG, SHORT_HASH_LEN, is_hex};
use crate::switch::SwitchEngine;
use camino::Utf8Path;
use log::{debug, info, warn};
use nvup_common::{AdvisoryLock, CancelToken};
use std::fs;
use std::time::Duration;

/// Result of a rollback request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The selected build is now the active nightly.
    RolledBack {
        /// The entry that was restored.
        restored: HistoryEntry,
        /// Short hash of the displaced nightly, when it could be kept.
        preserved: Option<String>,
    },
    /// The history is empty.
    NothingToRollBack,
}

/// Swaps preserved nightly builds into place.
pub struct Rollback<'a> {
    layout: &'a Layout,
    history: &'a HistoryStore<'a>,
    switch: &'a SwitchEngine<'a>,
    lock_timeout: Duration,
}

impl<'a> Rollback<'a> {
    /// Wire a rollback over the given store and switch engine.
    #[must_use]
    pub fn new(
        layout: &'a Layout,
        history: &'a HistoryStore<'a>,
        switch: &'a SwitchEngine<'a>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            layout,
            history,
            switch,
            lock_timeout,
        }
    }

    /// Make history entry `index` the active nightly.
    ///
    /// The displaced nightly is preserved as a backup and recorded at the
    /// head of the history, so rolling back to index 0 again rolls
    /// forward. `current` and the launcher are re-pointed at `nightly`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::HistoryIndexOutOfRange`] for a bad index,
    /// [`InstallerError::Lock`] when a lock cannot be taken in time, and
    /// [`InstallerError::Filesystem`] when a rename fails. A failed swap
    /// restores the displaced nightly.
    pub fn rollback_to(&self, index: usize, cancel: &CancelToken) -> Result<RollbackOutcome> {
        let entries = self.history.entries()?;
        if entries.is_empty() {
            return Ok(RollbackOutcome::NothingToRollBack);
        }
        let Some(selected) = entries.get(index).cloned() else {
            return Err(InstallerError::HistoryIndexOutOfRange {
                index,
                len: entries.len(),
            });
        };

        let preserved = self.swap_in(&selected, cancel)?;

        match &preserved {
            Some(entry) => self.history.record_entry(entry.clone(), cancel)?,
            // Prunes the restored entry, whose backup no longer exists.
            None => {
                self.history.entries()?;
            }
        }

        self.switch.point_to(NIGHTLY_TAG, cancel)?;
        info!("rolled nightly back to {}", selected.short_hash());
        Ok(RollbackOutcome::RolledBack {
            restored: selected,
            preserved: preserved.map(|entry| entry.short_hash().to_owned()),
        })
    }

    /// Move the selected backup into `nightly` under the relevant locks,
    /// returning the history entry for the displaced build if it was kept.
    fn swap_in(
        &self,
        selected: &HistoryEntry,
        cancel: &CancelToken,
    ) -> Result<Option<HistoryEntry>> {
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        let nightly = self.layout.version_dir(NIGHTLY_TAG);
        let source = self.layout.backup_dir(selected.short_hash());
        let _nightly_lock = AdvisoryLock::acquire(nightly.as_std_path(), &lock_cancel)?;
        let _source_lock = AdvisoryLock::acquire(source.as_std_path(), &lock_cancel)?;

        let displaced = self.displaced_commit()?;
        let mut kept = None;
        let mut moved = None;
        let mut discarded = None;

        if nightly.is_dir() {
            let backup = displaced
                .as_deref()
                .map(|commit| self.layout.backup_dir(short_hash(commit)))
                .filter(|backup| *backup != source);
            match (displaced.as_deref(), backup) {
                (Some(commit), Some(backup)) => {
                    let _backup_lock = AdvisoryLock::acquire(backup.as_std_path(), &lock_cancel)?;
                    if backup.exists() {
                        debug!("backup {backup} already present; discarding active nightly");
                        let retired = retired_path(&nightly);
                        rename(&nightly, &retired)?;
                        discarded = Some(retired);
                    } else {
                        rename(&nightly, &backup)?;
                        moved = Some(backup);
                    }
                    kept = Some(HistoryEntry::now(commit, NIGHTLY_TAG));
                }
                _ => {
                    if displaced.is_none() {
                        warn!("active nightly has no recorded commit; it will not be kept");
                    }
                    let retired = retired_path(&nightly);
                    rename(&nightly, &retired)?;
                    discarded = Some(retired);
                }
            }
        }

        if let Err(err) = rename(&source, &nightly) {
            // Put the displaced build back.
            if let Some(backup) = moved.as_ref().or(discarded.as_ref()) {
                let _ = fs::rename(backup, &nightly);
            }
            return Err(err);
        }
        if let Some(retired) = discarded {
            remove_tree(&retired);
        }
        Ok(kept)
    }

    /// Commit recorded for the active nightly, if it names one.
    fn displaced_commit(&self) -> Result<Option<String>> {
        let identifier = self.layout.read_identifier(NIGHTLY_TAG)?;
        Ok(identifier.filter(|id| id.len() >= SHORT_HASH_LEN && is_hex(id)))
    }
}

fn rename(from: &Utf8Path, to: &Utf8Path) -> Result<()> {
    fs::rename(from, to).map_err(|source| InstallerError::fs("rename", from, source))
}
