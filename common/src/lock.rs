//! Per-path advisory locking.
//!
//! Every mutating operation on a version directory (install commit,
//! uninstall, pointer switch, history eviction, rollback swap) holds an
//! exclusive lock on a side-car file beside the guarded path. The lock is
//! an OS-level file lock, so it serialises concurrent invocations of the
//! tool as well as threads within one process. Lock files carry no state;
//! they are left in place after release.

use crate::cancel::{CancelToken, Cancelled};
use fs2::FileExt;
use log::{debug, trace};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between `try_lock_exclusive` attempts while waiting.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors raised while acquiring an advisory lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock file could not be created or locked.
    #[error("failed to lock {path}: {source}")]
    Io {
        /// The lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Another holder kept the lock past the caller's deadline.
    #[error("timed out after {waited:?} waiting for lock on {path}")]
    Timeout {
        /// The guarded path.
        path: PathBuf,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The caller cancelled while waiting.
    #[error("cancelled while waiting for lock on {path}")]
    Cancelled {
        /// The guarded path.
        path: PathBuf,
    },
}

/// Return the lock file path guarding `guarded`.
///
/// The lock lives next to the guarded path as a hidden file so directory
/// listings of installed versions can skip it.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use nvup_common::lock_path_for;
///
/// let lock = lock_path_for(Path::new("/data/versions/v0.10.0"));
/// assert_eq!(lock, Path::new("/data/versions/.v0.10.0.lock"));
/// ```
#[must_use]
pub fn lock_path_for(guarded: &Path) -> PathBuf {
    let name = guarded
        .file_name()
        .map_or_else(|| "root".to_owned(), |n| n.to_string_lossy().into_owned());
    let lock_name = format!(".{name}.lock");
    match guarded.parent() {
        Some(parent) => parent.join(lock_name),
        None => PathBuf::from(lock_name),
    }
}

/// An exclusive lock held on a guarded path. Released on drop.
#[derive(Debug)]
pub struct AdvisoryLock {
    file: File,
    guarded: PathBuf,
}

impl AdvisoryLock {
    /// Block until the lock on `guarded` is held, the token is cancelled, or
    /// its deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the lock file cannot be opened,
    /// [`LockError::Timeout`] once the deadline passes, and
    /// [`LockError::Cancelled`] on explicit cancellation.
    pub fn acquire(guarded: &Path, cancel: &CancelToken) -> Result<Self, LockError> {
        let started = Instant::now();
        let file = open_lock_file(guarded)?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    trace!("locked {}", guarded.display());
                    return Ok(Self {
                        file,
                        guarded: guarded.to_path_buf(),
                    });
                }
                Err(err) if is_contended(&err) => {}
                Err(source) => {
                    return Err(LockError::Io {
                        path: lock_path_for(guarded),
                        source,
                    });
                }
            }

            match cancel.check() {
                Ok(()) => {}
                Err(Cancelled::DeadlineExceeded) => {
                    return Err(LockError::Timeout {
                        path: guarded.to_path_buf(),
                        waited: started.elapsed(),
                    });
                }
                Err(Cancelled::Requested) => {
                    return Err(LockError::Cancelled {
                        path: guarded.to_path_buf(),
                    });
                }
            }

            debug!("waiting for lock on {}", guarded.display());
            let pause = cancel
                .remaining()
                .map_or(LOCK_POLL_INTERVAL, |left| left.min(LOCK_POLL_INTERVAL));
            thread::sleep(pause);
        }
    }

    /// Take the lock only if it is free right now.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Io`] when the lock file cannot be opened or
    /// locking fails for a reason other than contention.
    pub fn try_acquire(guarded: &Path) -> Result<Option<Self>, LockError> {
        let file = open_lock_file(guarded)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                guarded: guarded.to_path_buf(),
            })),
            Err(err) if is_contended(&err) => Ok(None),
            Err(source) => Err(LockError::Io {
                path: lock_path_for(guarded),
                source,
            }),
        }
    }

    /// The path this lock guards.
    #[must_use]
    pub fn guarded_path(&self) -> &Path {
        &self.guarded
    }

    /// Release the lock explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            debug!("failed to unlock {}: {err}", self.guarded.display());
        }
    }
}

fn open_lock_file(guarded: &Path) -> Result<File, LockError> {
    let path = lock_path_for(guarded);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;
    }
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| LockError::Io { path, source })
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn lock_file_sits_beside_guarded_path() {
        let lock = lock_path_for(Path::new("versions/nightly"));
        assert_eq!(lock, Path::new("versions/.nightly.lock"));
    }

    #[test]
    fn second_holder_is_refused_while_first_holds() {
        let temp = tempfile::tempdir().expect("temp dir");
        let guarded = temp.path().join("v0.10.0");

        let first = AdvisoryLock::acquire(&guarded, &CancelToken::new()).expect("first lock");
        let second = AdvisoryLock::try_acquire(&guarded).expect("try lock");
        assert!(second.is_none(), "lock must be exclusive");

        first.release();
        let third = AdvisoryLock::try_acquire(&guarded).expect("try lock");
        assert!(third.is_some(), "lock must be free after release");
    }

    #[test]
    fn unrelated_paths_do_not_contend() {
        let temp = tempfile::tempdir().expect("temp dir");
        let _a = AdvisoryLock::acquire(&temp.path().join("a"), &CancelToken::new()).expect("a");
        let b = AdvisoryLock::try_acquire(&temp.path().join("b")).expect("try b");
        assert!(b.is_some());
    }

    #[test]
    fn waiting_acquire_times_out_at_deadline() {
        let temp = tempfile::tempdir().expect("temp dir");
        let guarded = temp.path().join("nightly");
        let _held = AdvisoryLock::acquire(&guarded, &CancelToken::new()).expect("held");

        let token = CancelToken::with_timeout(Duration::from_millis(120));
        let err = AdvisoryLock::acquire(&guarded, &token).expect_err("should time out");
        assert!(matches!(err, LockError::Timeout { .. }), "got {err}");
    }

    #[test]
    fn waiter_proceeds_once_holder_releases() {
        let temp = tempfile::tempdir().expect("temp dir");
        let guarded = temp.path().join("stable");
        let held = AdvisoryLock::acquire(&guarded, &CancelToken::new()).expect("held");

        let (tx, rx) = mpsc::channel();
        let waiter_path = guarded.clone();
        let waiter = std::thread::spawn(move || {
            let token = CancelToken::with_timeout(Duration::from_secs(10));
            let lock = AdvisoryLock::acquire(&waiter_path, &token);
            tx.send(lock.is_ok()).expect("send");
        });

        assert!(
            rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "waiter must block while the lock is held"
        );
        drop(held);
        assert!(rx.recv_timeout(Duration::from_secs(5)).expect("waiter result"));
        waiter.join().expect("join waiter");
    }
}
