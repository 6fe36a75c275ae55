//! Tests for CLI parsing and default behaviours.

use super::*;
use rstest::rstest;

#[test]
fn cli_requires_a_subcommand() {
    assert!(Cli::try_parse_from(["nvup"]).is_err());
}

#[rstest]
#[case::install(&["nvup", "install", "stable"], Command::Install(VersionArgs { version: "stable".to_owned() }))]
#[case::use_version(&["nvup", "use", "0.10.0"], Command::Use(VersionArgs { version: "0.10.0".to_owned() }))]
#[case::uninstall_alias(&["nvup", "rm", "v0.9.5"], Command::Uninstall(VersionArgs { version: "v0.9.5".to_owned() }))]
#[case::current(&["nvup", "current"], Command::Current)]
#[case::history(&["nvup", "history"], Command::History)]
#[case::list_alias(&["nvup", "ls"], Command::List(ListArgs::default()))]
#[case::list_json(&["nvup", "list", "--json"], Command::List(ListArgs { json: true }))]
#[case::list_remote(&["nvup", "list-remote", "--refresh"], Command::ListRemote(ListRemoteArgs { refresh: true }))]
fn cli_parses_subcommands(#[case] args: &[&str], #[case] expected: Command) {
    let cli = Cli::parse_from(args);
    assert_eq!(cli.command, expected);
}

#[test]
fn upgrade_defaults_to_nightly() {
    let cli = Cli::parse_from(["nvup", "upgrade"]);
    assert_eq!(
        cli.command,
        Command::Upgrade(UpgradeArgs {
            version: "nightly".to_owned()
        })
    );
}

#[rstest]
#[case::default(&["nvup", "rollback"], 0)]
#[case::explicit(&["nvup", "rollback", "2"], 2)]
fn rollback_parses_index(#[case] args: &[&str], #[case] expected: usize) {
    let cli = Cli::parse_from(args);
    assert_eq!(cli.command, Command::Rollback(RollbackArgs { index: expected }));
}

#[test]
fn rollback_rejects_negative_index() {
    assert!(Cli::try_parse_from(["nvup", "rollback", "-1"]).is_err());
}

#[test]
fn install_requires_a_version() {
    assert!(Cli::try_parse_from(["nvup", "install"]).is_err());
}

#[rstest]
#[case::default(&["nvup", "current"], "warn")]
#[case::verbose(&["nvup", "-v", "current"], "info")]
#[case::after_subcommand(&["nvup", "current", "-vvv"], "trace")]
#[case::quiet(&["nvup", "--quiet", "list"], "error")]
fn log_level_follows_flags(#[case] args: &[&str], #[case] expected: &str) {
    assert_eq!(Cli::parse_from(args).log_level(), expected);
}

#[test]
fn quiet_conflicts_with_verbose() {
    assert!(Cli::try_parse_from(["nvup", "-q", "-v", "current"]).is_err());
}
