//! Output formatting for version listings.
//!
//! Installed versions, upstream releases, and the nightly history are
//! rendered either for people or as JSON for scripts.

use crate::history::HistoryEntry;
use crate::manager::InstalledVersion;
use crate::release::Release;
use serde::Serialize;
use std::fmt::Write as _;

/// Format installed versions for human-readable output.
///
/// # Examples
///
/// ```
/// use nvup_installer::list_output::format_installed;
///
/// let output = format_installed(&[]);
/// assert!(output.contains("No versions installed"));
/// ```
#[must_use]
pub fn format_installed(versions: &[InstalledVersion]) -> String {
    if versions.is_empty() {
        return String::from(
            "No versions installed.\n\nRun `nvup install stable` to install the latest release.",
        );
    }

    let mut output = String::from("Installed versions:\n");
    for version in versions {
        let marker = if version.active { "*" } else { " " };
        let _ = write!(output, "{marker} {}", version.name);
        if let Some(identifier) = version
            .identifier
            .as_deref()
            .filter(|id| *id != version.name)
        {
            let _ = write!(output, " ({identifier})");
        }
        output.push('\n');
    }
    output
}

/// Format installed versions as JSON.
///
/// # Examples
///
/// ```
/// use nvup_installer::list_output::format_installed_json;
///
/// let json = format_installed_json(&[]);
/// assert!(json.contains("\"versions\""));
/// ```
#[must_use]
pub fn format_installed_json(versions: &[InstalledVersion]) -> String {
    #[derive(Serialize)]
    struct Listing<'a> {
        versions: &'a [InstalledVersion],
    }

    serde_json::to_string_pretty(&Listing { versions })
        .unwrap_or_else(|_| "{\"versions\": []}".to_owned())
}

/// Format upstream releases, newest first.
#[must_use]
pub fn format_remote(releases: &[Release], installed: &[InstalledVersion]) -> String {
    if releases.is_empty() {
        return String::from("No releases available.");
    }

    let mut output = String::from("Available releases:\n");
    for release in releases {
        let _ = write!(output, "  {}", release.tag);
        if release.is_prerelease {
            output.push_str(" (prerelease)");
        }
        if let Some(short) = release.short_commit().filter(|_| release.is_sentinel()) {
            let _ = write!(output, " [{short}]");
        }
        if installed.iter().any(|v| v.name == release.tag) {
            output.push_str(" - installed");
        }
        output.push('\n');
    }
    output
}

/// Format the nightly history with the indices `rollback` accepts.
///
/// # Examples
///
/// ```
/// use nvup_installer::list_output::format_history;
///
/// assert!(format_history(&[]).contains("No nightly history"));
/// ```
#[must_use]
pub fn format_history(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return String::from(
            "No nightly history.\n\nPrevious nightlies are kept here after `nvup upgrade nightly`.",
        );
    }

    let mut output = String::from("Nightly history (most recent first):\n");
    for (index, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            output,
            "  {index}: {} installed {}",
            entry.short_hash(),
            entry.installed_at.format("%Y-%m-%d %H:%M UTC"),
        );
    }
    output
}
