//! Bounded history of superseded nightly installs.
//!
//! Each time a nightly upgrade replaces the active `nightly` directory, the
//! old tree is kept as `nightly-<short hash>` and recorded here, most recent
//! first. The file is rewritten atomically on every change, under its own
//! advisory lock, and entries whose backup directory has disappeared are
//! pruned when the history is read.

use crate::error::{InstallerError, Result};
use crate::layout::Layout;
use crate::pipeline::{remove_tree, retired_path};
use crate::release::SHORT_HASH_LEN;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use nvup_common::{AdvisoryLock, CancelToken, write_atomic};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::time::Duration;

/// One superseded nightly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Commit the nightly was built from.
    pub commit_hash: String,
    /// When it was installed.
    pub installed_at: DateTime<Utc>,
    /// Release tag, normally `nightly`.
    pub tag_name: String,
}

impl HistoryEntry {
    /// An entry for `commit_hash` stamped with the current time.
    #[must_use]
    pub fn now(commit_hash: &str, tag_name: &str) -> Self {
        Self {
            commit_hash: commit_hash.to_owned(),
            installed_at: Utc::now(),
            tag_name: tag_name.to_owned(),
        }
    }

    /// The abbreviated commit naming the backup directory.
    #[must_use]
    pub fn short_hash(&self) -> &str {
        short_hash(&self.commit_hash)
    }
}

/// First [`SHORT_HASH_LEN`] characters of `commit`.
#[must_use]
pub fn short_hash(commit: &str) -> &str {
    commit
        .char_indices()
        .nth(SHORT_HASH_LEN)
        .map_or(commit, |(end, _)| &commit[..end])
}

/// Persisted history document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightlyHistory {
    /// Entries, most recent first.
    pub entries: Vec<HistoryEntry>,
    /// Retention limit in force when last written.
    pub limit: usize,
}

/// Reads and updates the nightly history file.
#[derive(Debug, Clone)]
pub struct HistoryStore<'a> {
    layout: &'a Layout,
    limit: usize,
    lock_timeout: Duration,
}

impl<'a> HistoryStore<'a> {
    /// A store keeping at most `limit` entries.
    #[must_use]
    pub fn new(layout: &'a Layout, limit: usize, lock_timeout: Duration) -> Self {
        Self {
            layout,
            limit: limit.max(1),
            lock_timeout,
        }
    }

    /// The retention limit.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Entries whose backup directory still exists, most recent first.
    ///
    /// Pruned entries are written back so the file matches the disk.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the history file cannot
    /// be read or rewritten, or [`InstallerError::Lock`] when a prune cannot
    /// take the history lock.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        let stored = self.read()?;
        let before = stored.len();
        let entries = self.present(stored);
        if entries.len() == before {
            return Ok(entries);
        }
        let _lock = self.lock(&CancelToken::new())?;
        self.pruned()
    }

    /// Record `commit_hash` as the most recently superseded nightly.
    ///
    /// An older entry with the same short hash is replaced. Entries beyond
    /// the limit are dropped and their backup directories deleted under
    /// their locks.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the history cannot be
    /// persisted, or [`InstallerError::Lock`] when the history lock or an
    /// evicted backup's lock cannot be taken.
    pub fn record(&self, commit_hash: &str, tag_name: &str, cancel: &CancelToken) -> Result<()> {
        self.record_entry(HistoryEntry::now(commit_hash, tag_name), cancel)
    }

    /// Insert `entry` at the head, as [`Self::record`] does.
    ///
    /// # Errors
    ///
    /// As for [`Self::record`].
    pub fn record_entry(&self, entry: HistoryEntry, cancel: &CancelToken) -> Result<()> {
        let lock = self.lock(cancel)?;
        let mut entries = self.pruned()?;
        let short = entry.short_hash().to_owned();
        entries.retain(|existing| existing.short_hash() != short);
        entries.insert(0, entry);

        let evicted = if entries.len() > self.limit {
            entries.split_off(self.limit)
        } else {
            Vec::new()
        };
        self.write(&entries)?;
        drop(lock);
        info!("recorded nightly {short} in history");

        for old in evicted {
            self.discard_backup(old.short_hash(), cancel)?;
        }
        Ok(())
    }

    /// Remove the entry for `short` without touching its directory.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] when the history cannot be
    /// read or persisted, or [`InstallerError::Lock`] when the history lock
    /// times out.
    pub fn forget(&self, short: &str) -> Result<()> {
        let _lock = self.lock(&CancelToken::new())?;
        let mut entries = self.read()?;
        entries.retain(|entry| entry.short_hash() != short);
        self.write(&entries)
    }

    /// Rewrite the history with exactly `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Filesystem`] on write failure, or
    /// [`InstallerError::Lock`] when the history lock times out.
    pub fn replace(&self, entries: &[HistoryEntry]) -> Result<()> {
        let _lock = self.lock(&CancelToken::new())?;
        self.write(entries)
    }

    /// Serialise read-modify-write cycles on the history file.
    fn lock(&self, cancel: &CancelToken) -> Result<AdvisoryLock> {
        let path = self.layout.history_file();
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        Ok(AdvisoryLock::acquire(path.as_std_path(), &lock_cancel)?)
    }

    /// Re-read and prune with the history lock already held.
    fn pruned(&self) -> Result<Vec<HistoryEntry>> {
        let stored = self.read()?;
        let before = stored.len();
        let entries = self.present(stored);
        if entries.len() != before {
            self.write(&entries)?;
        }
        Ok(entries)
    }

    fn present(&self, stored: Vec<HistoryEntry>) -> Vec<HistoryEntry> {
        stored
            .into_iter()
            .filter(|entry| {
                let present = self.layout.backup_dir(entry.short_hash()).is_dir();
                if !present {
                    debug!("dropping history entry {}: backup is gone", entry.commit_hash);
                }
                present
            })
            .collect()
    }

    fn discard_backup(&self, short: &str, cancel: &CancelToken) -> Result<()> {
        let dir = self.layout.backup_dir(short);
        let lock_cancel = cancel.child_with_timeout(self.lock_timeout);
        let _lock = AdvisoryLock::acquire(dir.as_std_path(), &lock_cancel)?;
        if !dir.is_dir() {
            return Ok(());
        }
        let retired = retired_path(&dir);
        fs::rename(&dir, &retired).map_err(|source| InstallerError::fs("retire", &dir, source))?;
        remove_tree(&retired);
        info!("evicted nightly backup {short}");
        Ok(())
    }

    fn read(&self) -> Result<Vec<HistoryEntry>> {
        let path = self.layout.history_file();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(InstallerError::fs("read", path, source)),
        };
        match serde_json::from_str::<NightlyHistory>(&text) {
            Ok(history) => Ok(history.entries),
            Err(err) => {
                warn!("ignoring unreadable nightly history {path}: {err}");
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        let path = self.layout.history_file();
        let document = NightlyHistory {
            entries: entries.to_vec(),
            limit: self.limit,
        };
        let json = serde_json::to_vec_pretty(&document).map_err(|source| InstallerError::Encode {
            what: "nightly history",
            source,
        })?;
        write_atomic(path.as_std_path(), &json)
            .map_err(|source| InstallerError::fs("write", path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Env {
        _temp: TempDir,
        layout: Layout,
    }

    impl Env {
        fn store(&self, limit: usize) -> HistoryStore<'_> {
            HistoryStore::new(&self.layout, limit, Duration::from_secs(1))
        }

        fn backup(&self, commit: &str) {
            fs::create_dir_all(self.layout.backup_dir(short_hash(commit))).expect("backup dir");
        }
    }

    #[fixture]
    fn env() -> Env {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8");
        Env {
            layout: Layout::new(root.join("data"), root.join("bin")),
            _temp: temp,
        }
    }

    fn commits(entries: &[HistoryEntry]) -> Vec<&str> {
        entries.iter().map(HistoryEntry::short_hash).collect()
    }

    #[rstest]
    fn missing_file_is_empty_history(env: Env) {
        assert!(env.store(5).entries().expect("entries").is_empty());
    }

    #[rstest]
    fn record_inserts_most_recent_first(env: Env) {
        let store = env.store(5);
        for commit in ["aaaaaaa111", "bbbbbbb222"] {
            env.backup(commit);
            store.record(commit, "nightly", &CancelToken::new()).expect("record");
        }

        let entries = store.entries().expect("entries");

        assert_eq!(commits(&entries), vec!["bbbbbbb", "aaaaaaa"]);
        assert_eq!(entries[0].commit_hash, "bbbbbbb222");
    }

    #[rstest]
    fn record_deduplicates_by_short_hash(env: Env) {
        let store = env.store(5);
        env.backup("aaaaaaa");
        env.backup("bbbbbbb");
        for commit in ["aaaaaaa", "bbbbbbb", "aaaaaaa999"] {
            store.record(commit, "nightly", &CancelToken::new()).expect("record");
        }

        let entries = store.entries().expect("entries");

        assert_eq!(commits(&entries), vec!["aaaaaaa", "bbbbbbb"]);
        assert_eq!(entries[0].commit_hash, "aaaaaaa999");
    }

    #[rstest]
    fn retention_evicts_oldest_and_deletes_its_backup(env: Env) {
        let store = env.store(2);
        for commit in ["aaaaaaa", "bbbbbbb", "ccccccc"] {
            env.backup(commit);
            store.record(commit, "nightly", &CancelToken::new()).expect("record");
        }

        let entries = store.entries().expect("entries");

        assert_eq!(commits(&entries), vec!["ccccccc", "bbbbbbb"]);
        assert!(!env.layout.backup_dir("aaaaaaa").exists());
        assert!(env.layout.backup_dir("bbbbbbb").is_dir());
    }

    #[rstest]
    fn entries_prune_missing_backups_and_persist(env: Env) {
        let store = env.store(5);
        for commit in ["aaaaaaa", "bbbbbbb"] {
            env.backup(commit);
            store.record(commit, "nightly", &CancelToken::new()).expect("record");
        }
        fs::remove_dir_all(env.layout.backup_dir("aaaaaaa")).expect("remove backup");

        let entries = store.entries().expect("entries");
        let on_disk: NightlyHistory = serde_json::from_str(
            &fs::read_to_string(env.layout.history_file()).expect("history file"),
        )
        .expect("valid json");

        assert_eq!(commits(&entries), vec!["bbbbbbb"]);
        assert_eq!(on_disk.entries, entries);
        assert_eq!(on_disk.limit, 5);
    }

    #[rstest]
    fn corrupt_file_reads_as_empty(env: Env) {
        fs::create_dir_all(env.layout.data_dir()).expect("data dir");
        fs::write(env.layout.history_file(), "{ not json").expect("corrupt file");

        assert!(env.store(5).entries().expect("entries").is_empty());
    }

    #[rstest]
    fn concurrent_records_keep_every_entry(env: Env) {
        let commits_to_record = ["aaaaaaa111", "bbbbbbb222", "ccccccc333", "ddddddd444"];
        for commit in commits_to_record {
            env.backup(commit);
        }
        let store = env.store(10);

        std::thread::scope(|scope| {
            for pair in commits_to_record.chunks(2) {
                let store = &store;
                scope.spawn(move || {
                    for commit in pair {
                        store
                            .record(commit, "nightly", &CancelToken::new())
                            .expect("record");
                    }
                });
            }
        });

        let entries = store.entries().expect("entries");
        let mut recorded = commits(&entries);
        recorded.sort_unstable();
        assert_eq!(recorded, vec!["aaaaaaa", "bbbbbbb", "ccccccc", "ddddddd"]);
    }

    #[rstest]
    fn record_waits_for_the_history_lock(env: Env) {
        env.backup("aaaaaaa");
        let store = env.store(5);
        let held = AdvisoryLock::acquire(
            env.layout.history_file().as_std_path(),
            &CancelToken::new(),
        )
        .expect("history lock");

        let err = HistoryStore::new(&env.layout, 5, Duration::from_millis(100))
            .record("aaaaaaa", "nightly", &CancelToken::new())
            .expect_err("history is locked");
        assert!(matches!(err, InstallerError::Lock(_)), "got {err}");

        drop(held);
        store
            .record("aaaaaaa", "nightly", &CancelToken::new())
            .expect("record after release");
        assert_eq!(commits(&store.entries().expect("entries")), vec!["aaaaaaa"]);
    }

    #[test]
    fn file_uses_camel_case_fields() {
        let entry = HistoryEntry {
            commit_hash: "27fb62988e922c2739035f477f93cc052a4fee1e".to_owned(),
            installed_at: DateTime::<Utc>::from_timestamp(0, 0).expect("epoch"),
            tag_name: "nightly".to_owned(),
        };

        let json = serde_json::to_string(&entry).expect("serialise");

        assert!(json.contains("\"commitHash\""));
        assert!(json.contains("\"installedAt\""));
        assert!(json.contains("\"tagName\""));
    }

    #[rstest]
    #[case("27fb62988e922c27", "27fb629")]
    #[case("abc", "abc")]
    fn short_hash_truncates(#[case] commit: &str, #[case] expected: &str) {
        assert_eq!(short_hash(commit), expected);
    }
}
