//! Output formatting for the nvup CLI.
//!
//! Messages for install, switch, and rollback outcomes, the progress line,
//! and the shell snippets that put the launcher directory on `PATH`.

use crate::manager::{InstallOutcome, UseOutcome};
use crate::progress::Phase;
use crate::rollback::RollbackOutcome;
use camino::Utf8Path;
use std::fmt::Display;
use std::io::Write;

/// Shell configuration snippets adding the launcher directory to `PATH`.
#[derive(Debug, Clone)]
pub struct ShellSnippet {
    /// Export line for bash/zsh.
    pub bash: String,
    /// Set line for fish shell.
    pub fish: String,
    /// Set line for PowerShell.
    pub powershell: String,
}

impl ShellSnippet {
    /// Create shell snippets for the given launcher directory.
    ///
    /// # Example
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use nvup_installer::output::ShellSnippet;
    ///
    /// let path = Utf8PathBuf::from("/home/user/.local/share/nvup/bin");
    /// let snippet = ShellSnippet::new(&path);
    ///
    /// assert!(snippet.bash.contains("PATH"));
    /// ```
    #[must_use]
    pub fn new(launcher_dir: &Utf8Path) -> Self {
        Self {
            bash: format!("export PATH=\"{launcher_dir}:$PATH\""),
            fish: format!("fish_add_path \"{launcher_dir}\""),
            powershell: format!("$env:PATH = \"{launcher_dir};$env:PATH\""),
        }
    }

    /// Format the snippet for display to the user.
    #[must_use]
    pub fn display_text(&self) -> String {
        format!(
            concat!(
                "Add the following to your shell configuration:\n\n",
                "  # bash/zsh (~/.bashrc, ~/.zshrc)\n",
                "  {}\n\n",
                "  # fish (~/.config/fish/config.fish)\n",
                "  {}\n\n",
                "  # PowerShell ($PROFILE)\n",
                "  {}"
            ),
            self.bash, self.fish, self.powershell
        )
    }
}

/// Returns `true` when `dir` appears in the `PATH` value `path_var`.
#[must_use]
pub fn path_contains(path_var: &std::ffi::OsStr, dir: &Utf8Path) -> bool {
    std::env::split_paths(path_var).any(|entry| entry == dir.as_std_path())
}

/// Describe an install or upgrade outcome.
#[must_use]
pub fn install_message(outcome: &InstallOutcome) -> String {
    match outcome {
        InstallOutcome::Installed {
            name,
            identifier,
            activated,
        } => {
            let mut message = format!("Installed {name}");
            if identifier != name {
                message.push_str(&format!(" ({identifier})"));
            }
            if *activated {
                message.push_str(" and made it the active version");
            } else {
                message.push_str(&format!(". Run `nvup use {name}` to switch to it"));
            }
            message
        }
        InstallOutcome::UpToDate { name } => format!("{name} is already up to date"),
    }
}

/// Describe a switch outcome.
#[must_use]
pub fn use_message(outcome: &UseOutcome) -> String {
    match outcome {
        UseOutcome::Switched { name, binary } => {
            format!("Now using {name} ({})", binary.display())
        }
        UseOutcome::AlreadyActive { name } => format!("{name} is already active"),
    }
}

/// Describe a rollback outcome.
#[must_use]
pub fn rollback_message(outcome: &RollbackOutcome) -> String {
    match outcome {
        RollbackOutcome::RolledBack {
            restored,
            preserved,
        } => {
            let mut message = format!("Rolled nightly back to {}", restored.short_hash());
            if let Some(short) = preserved {
                message.push_str(&format!("; previous build kept as nightly-{short}"));
            }
            message
        }
        RollbackOutcome::NothingToRollBack => {
            "Nothing to roll back: the nightly history is empty".to_owned()
        }
    }
}

/// Render one progress update, e.g. `downloading 42%`.
#[must_use]
pub fn progress_line(phase: Phase, percent: Option<u8>) -> String {
    match percent {
        Some(percent) => format!("{phase} {percent}%"),
        None => format!("{phase}..."),
    }
}

/// Write `message` and a newline to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEntry;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;

    /// Shared fixture providing a launcher directory.
    #[fixture]
    fn launcher_dir() -> Utf8PathBuf {
        Utf8PathBuf::from("/home/user/.local/share/nvup/bin")
    }

    #[rstest]
    fn snippet_contains_path(launcher_dir: Utf8PathBuf) {
        let snippet = ShellSnippet::new(&launcher_dir);

        assert!(snippet.bash.starts_with("export PATH="));
        assert!(snippet.fish.contains(launcher_dir.as_str()));
        assert!(snippet.powershell.contains(launcher_dir.as_str()));
        assert!(snippet.display_text().contains("bash/zsh"));
    }

    #[cfg(unix)]
    #[rstest]
    #[case::present("/usr/bin:/home/user/.local/share/nvup/bin", true)]
    #[case::absent("/usr/bin:/bin", false)]
    fn path_membership(launcher_dir: Utf8PathBuf, #[case] path: &str, #[case] expected: bool) {
        assert_eq!(path_contains(path.as_ref(), &launcher_dir), expected);
    }

    #[rstest]
    #[case::activated(
        InstallOutcome::Installed {
            name: "v0.10.0".to_owned(),
            identifier: "v0.10.0".to_owned(),
            activated: true,
        },
        "Installed v0.10.0 and made it the active version"
    )]
    #[case::inactive(
        InstallOutcome::Installed {
            name: "nightly".to_owned(),
            identifier: "27fb629".to_owned(),
            activated: false,
        },
        "Installed nightly (27fb629). Run `nvup use nightly` to switch to it"
    )]
    #[case::up_to_date(
        InstallOutcome::UpToDate { name: "v0.9.5".to_owned() },
        "v0.9.5 is already up to date"
    )]
    fn install_messages(#[case] outcome: InstallOutcome, #[case] expected: &str) {
        assert_eq!(install_message(&outcome), expected);
    }

    #[test]
    fn use_message_names_the_binary() {
        let outcome = UseOutcome::Switched {
            name: "v0.10.0".to_owned(),
            binary: PathBuf::from("/data/versions/v0.10.0/bin/nvim"),
        };

        assert_eq!(
            use_message(&outcome),
            "Now using v0.10.0 (/data/versions/v0.10.0/bin/nvim)"
        );
    }

    #[test]
    fn rollback_message_mentions_the_kept_build() {
        let outcome = RollbackOutcome::RolledBack {
            restored: HistoryEntry::now("aaaaaaa1111", "nightly"),
            preserved: Some("bbbbbbb".to_owned()),
        };

        assert_eq!(
            rollback_message(&outcome),
            "Rolled nightly back to aaaaaaa; previous build kept as nightly-bbbbbbb"
        );
    }

    #[rstest]
    #[case(Phase::Downloading, Some(42), "downloading 42%")]
    #[case(Phase::Extracting, None, "extracting...")]
    fn progress_lines(#[case] phase: Phase, #[case] percent: Option<u8>, #[case] expected: &str) {
        assert_eq!(progress_line(phase, percent), expected);
    }

    #[test]
    fn write_stderr_line_appends_newline() {
        let mut buffer = Vec::new();

        write_stderr_line(&mut buffer, "hello");

        assert_eq!(buffer, b"hello\n");
    }
}
