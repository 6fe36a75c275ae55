//! Install progress reporting.
//!
//! The pipeline reports `(phase, percent)` pairs to a plain callback. A
//! percentage is only known while downloading a response that carries a
//! content length; everything else is indeterminate (`None`).

use std::fmt;

/// A step of the install pipeline as seen by a progress observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Streaming the archive.
    Downloading,
    /// Comparing the archive against its published checksum.
    Verifying,
    /// No checksum is published, so verification was skipped.
    VerificationSkipped,
    /// Unpacking into the staging directory.
    Extracting,
    /// Renaming the staged tree into place.
    Committing,
    /// The version is installed.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Downloading => "downloading",
            Self::Verifying => "verifying checksum",
            Self::VerificationSkipped => "no checksum published; skipping verification",
            Self::Extracting => "extracting",
            Self::Committing => "installing",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Progress callback: `(phase, percent)`.
pub type ProgressFn<'a> = dyn FnMut(Phase, Option<u8>) + 'a;

/// Forwards progress to a callback, suppressing repeats and regressions.
pub struct ProgressReporter<'a, 'f> {
    callback: &'a mut ProgressFn<'f>,
    last: Option<(Phase, Option<u8>)>,
}

impl<'a, 'f> ProgressReporter<'a, 'f> {
    /// Wrap `callback`.
    pub fn new(callback: &'a mut ProgressFn<'f>) -> Self {
        Self {
            callback,
            last: None,
        }
    }

    /// Announce the start of `phase` with an indeterminate percentage.
    pub fn phase(&mut self, phase: Phase) {
        self.emit(phase, None);
    }

    /// Report download progress from byte counts.
    pub fn bytes(&mut self, done: u64, total: Option<u64>) {
        let percent = total.filter(|t| *t > 0).map(|t| percent_of(done, t));
        match (self.last, percent) {
            // Only forward increases once a percentage is known.
            (Some((Phase::Downloading, Some(prev))), Some(now)) if now <= prev => {}
            // Without a length there is nothing new to report per chunk.
            (Some((Phase::Downloading, _)), None) => {}
            _ => self.emit(Phase::Downloading, percent),
        }
    }

    fn emit(&mut self, phase: Phase, percent: Option<u8>) {
        if self.last == Some((phase, percent)) {
            return;
        }
        self.last = Some((phase, percent));
        (self.callback)(phase, percent);
    }
}

/// `done / total` as a whole percentage, clamped to 100.
#[must_use]
pub fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let scaled = u128::from(done.min(total)) * 100 / u128::from(total);
    u8::try_from(scaled).unwrap_or(100)
}
