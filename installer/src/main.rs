//! nvup CLI entrypoint.
//!
//! Parses arguments, wires the production collaborators into a
//! [`VersionManager`], and prints the outcome. Results a script might consume
//! go to stdout; progress and messages go to stderr.

use clap::Parser;
use nvup_common::CancelToken;
use nvup_installer::archive::ArchiveCodec;
use nvup_installer::cli::{Cli, Command};
use nvup_installer::config::{CONFIG_FILE, Config};
use nvup_installer::dirs::SystemBaseDirs;
use nvup_installer::download::HttpDownloader;
use nvup_installer::error::{InstallerError, Result};
use nvup_installer::list_output::{
    format_history, format_installed, format_installed_json, format_remote,
};
use nvup_installer::manager::{Collaborators, InstallOutcome, VersionManager};
use nvup_installer::output::{
    ShellSnippet, install_message, path_contains, progress_line, rollback_message, use_message,
    write_stderr_line,
};
use nvup_installer::progress::{Phase, ProgressFn};
use nvup_installer::release::GitHubReleaseSource;
use nvup_installer::source_build::{GitSourceBuilder, SystemCommandExecutor};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "NVUP_LOG";

/// Exit code for an interrupted or timed-out operation.
const CANCELLED_EXIT_CODE: i32 = 130;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let run_result = run(&cli, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(cli: &Cli) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    // A subscriber may already be installed; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: &Cli, stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<()> {
    let dirs = SystemBaseDirs::new().ok_or_else(|| InstallerError::Config {
        path: PathBuf::from(CONFIG_FILE),
        reason: "could not determine the home directory".to_owned(),
    })?;
    let config = Config::load(&dirs)?;
    let layout = config.layout(&dirs)?;

    let releases = GitHubReleaseSource::from_env(config.release_api_url.clone());
    let downloader = HttpDownloader::new(config.download_timeout());
    let executor = SystemCommandExecutor;
    let builder = GitSourceBuilder::new(
        &executor,
        config.source_repo_url.clone(),
        layout.source_dir().into_std_path_buf(),
    );
    let collaborators = Collaborators {
        releases: &releases,
        downloader: &downloader,
        extractor: &ArchiveCodec,
        builder: &builder,
    };
    let manager = VersionManager::new(layout, &config, collaborators)?;

    dispatch(cli, &manager, &config.operation_token(), stdout, stderr)
}

/// Run the selected subcommand against `manager`.
fn dispatch(
    cli: &Cli,
    manager: &VersionManager<'_>,
    cancel: &CancelToken,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    match &cli.command {
        Command::Install(args) => {
            let outcome = with_progress(cli.quiet, stderr, |on_progress| {
                manager.install(&args.version, cancel, on_progress)
            })?;
            report_install(cli, manager, &outcome, stderr);
        }
        Command::Upgrade(args) => {
            let outcome = with_progress(cli.quiet, stderr, |on_progress| {
                manager.upgrade(&args.version, cancel, on_progress)
            })?;
            report_install(cli, manager, &outcome, stderr);
        }
        Command::Use(args) => {
            let outcome = with_progress(cli.quiet, stderr, |on_progress| {
                manager.use_version(&args.version, cancel, on_progress)
            })?;
            write_stderr_line(stderr, use_message(&outcome));
        }
        Command::Current => match manager.current()? {
            Some(name) => writeln!(stdout, "{name}")?,
            None => write_stderr_line(
                stderr,
                "No version is active. Run `nvup install stable` to install one.",
            ),
        },
        Command::Uninstall(args) => {
            manager.uninstall(&args.version, cancel)?;
            if !cli.quiet {
                write_stderr_line(stderr, format!("Uninstalled {}", args.version));
            }
        }
        Command::List(args) => {
            let versions = manager.list()?;
            let text = if args.json {
                format_installed_json(&versions)
            } else {
                format_installed(&versions)
            };
            writeln!(stdout, "{}", text.trim_end())?;
        }
        Command::ListRemote(args) => {
            let releases = manager.available(args.refresh)?;
            let installed = manager.list()?;
            writeln!(stdout, "{}", format_remote(&releases, &installed).trim_end())?;
        }
        Command::History => {
            let entries = manager.history()?;
            writeln!(stdout, "{}", format_history(&entries).trim_end())?;
        }
        Command::Rollback(args) => {
            let outcome = manager.rollback_to(args.index, cancel)?;
            write_stderr_line(stderr, rollback_message(&outcome));
        }
    }
    Ok(())
}

/// Run `action` with a progress callback printing to `stderr`.
///
/// Download percentages are thinned to quarter steps.
fn with_progress<T>(
    quiet: bool,
    stderr: &mut dyn Write,
    action: impl FnOnce(&mut ProgressFn<'_>) -> Result<T>,
) -> Result<T> {
    let mut on_progress = |phase: Phase, percent: Option<u8>| {
        if !quiet && percent.is_none_or(|p| p % 25 == 0) {
            write_stderr_line(stderr, progress_line(phase, percent));
        }
    };
    action(&mut on_progress)
}

fn report_install(
    cli: &Cli,
    manager: &VersionManager<'_>,
    outcome: &InstallOutcome,
    stderr: &mut dyn Write,
) {
    write_stderr_line(stderr, install_message(outcome));
    let activated = matches!(outcome, InstallOutcome::Installed { activated: true, .. });
    if !activated || cli.quiet {
        return;
    }
    let launcher_dir = manager.layout().launcher_dir();
    let on_path = std::env::var_os("PATH").is_some_and(|path| path_contains(&path, launcher_dir));
    if !on_path {
        write_stderr_line(stderr, "");
        write_stderr_line(stderr, ShellSnippet::new(launcher_dir).display_text());
    }
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            if err.is_cancelled() {
                CANCELLED_EXIT_CODE
            } else {
                1
            }
        }
    }
}
