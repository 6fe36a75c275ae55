//! Cooperative cancellation with an optional deadline.
//!
//! A [`CancelToken`] is cheap to clone; clones share the same cancellation
//! flag. Long-running loops (downloads, extraction, lock polling, child
//! processes) call [`CancelToken::check`] between units of work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Reason a cancellable operation stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Cancelled {
    /// [`CancelToken::cancel`] was called.
    #[error("operation cancelled")]
    Requested,
    /// The token's deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Shared cancellation flag plus an optional deadline.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use nvup_common::CancelToken;
///
/// let token = CancelToken::with_timeout(Duration::from_secs(30));
/// assert!(token.check().is_ok());
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never expires on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A token that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Derive a token sharing this token's flag whose deadline is the earlier
    /// of the parent deadline and `timeout` from now.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    /// Request cancellation for this token and all of its clones.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Returns an error if the operation should stop now.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled::Requested`] after [`Self::cancel`] and
    /// [`Cancelled::DeadlineExceeded`] once the deadline has passed.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.flag.load(Ordering::SeqCst) {
            return Err(Cancelled::Requested);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Cancelled::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Time left before the deadline, or `None` when there is no deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}
