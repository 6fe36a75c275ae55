//! CLI argument definitions for nvup.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use clap::{Parser, Subcommand};

/// Install and switch between Neovim versions.
#[derive(Parser, Debug)]
#[command(name = "nvup")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install and switch between Neovim versions.\n\n",
    "nvup downloads official Neovim release archives, verifies them against ",
    "their published checksums, and keeps each version in its own directory. ",
    "A launcher link named `nvim` always points at the active version.\n\n",
    "Nightly upgrades keep the previous build so it can be restored with ",
    "`nvup rollback`.",
))]
#[command(after_help = concat!(
    "VERSIONS:\n",
    "  stable        The newest stable release, installed under its version tag\n",
    "  nightly       The rolling nightly prerelease\n",
    "  0.10.0        An exact release (a leading `v` is optional)\n",
    "  27fb629       A commit hash or `master`, built from source\n\n",
    "EXAMPLES:\n",
    "  Install and activate the latest stable release:\n",
    "    $ nvup install stable\n\n",
    "  Upgrade the nightly, keeping the previous build:\n",
    "    $ nvup upgrade nightly\n\n",
    "  Show preserved nightlies and restore one:\n",
    "    $ nvup history\n",
    "    $ nvup rollback 0\n\n",
    "Set NVUP_LOG (e.g. NVUP_LOG=debug) for diagnostic logging.",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(
        short,
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Install a version; the first install becomes active.
    Install(VersionArgs),

    /// Install a version after refreshing the release list.
    Upgrade(UpgradeArgs),

    /// Make a version active, installing it first if needed.
    Use(VersionArgs),

    /// Print the active version.
    Current,

    /// Remove an installed version.
    #[command(alias = "rm")]
    Uninstall(VersionArgs),

    /// List installed versions.
    #[command(alias = "ls")]
    List(ListArgs),

    /// List releases available upstream.
    ListRemote(ListRemoteArgs),

    /// Show preserved nightly builds.
    History,

    /// Restore a preserved nightly build by its history index.
    Rollback(RollbackArgs),
}

/// Arguments naming one version.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct VersionArgs {
    /// `stable`, `nightly`, a release such as `0.10.0`, or a commit.
    #[arg(value_name = "VERSION")]
    pub version: String,
}

/// Arguments for the upgrade command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct UpgradeArgs {
    /// Version to upgrade.
    #[arg(value_name = "VERSION", default_value = "nightly")]
    pub version: String,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the list-remote command.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRemoteArgs {
    /// Ignore the cached release list.
    #[arg(long)]
    pub refresh: bool,
}

/// Arguments for the rollback command.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct RollbackArgs {
    /// History index as shown by `nvup history`; 0 is the most recent.
    #[arg(value_name = "INDEX", default_value_t = 0)]
    pub index: usize,
}

impl Cli {
    /// Default log filter implied by `-v` flags, used when `NVUP_LOG` is
    /// unset.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use nvup_installer::cli::Cli;
    ///
    /// let cli = Cli::parse_from(["nvup", "-vv", "current"]);
    /// assert_eq!(cli.log_level(), "debug");
    /// ```
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
