//! Building Neovim from a source commit.
//!
//! Commit aliases have no prebuilt asset. The checkout under
//! `<data>/source` is cloned once and fetched on later builds, the requested
//! reference is checked out detached, and the tree is built with `make` and
//! installed into a caller-provided prefix. The caller commits that prefix
//! exactly as it would an extracted archive.

use crate::error::{InstallerError, Result};
use log::{debug, info};
use nvup_common::CancelToken;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Upper bound for a single git operation.
const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound for a single make invocation.
const BUILD_TIMEOUT: Duration = Duration::from_secs(3600);

/// How often a running command checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runs external commands.
pub trait CommandExecutor {
    /// Run `cmd` with `args`, optionally in `cwd`, and capture its output.
    ///
    /// The command is killed if `cancel` fires or its deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Io`] when the command cannot be spawned and
    /// [`InstallerError::Cancelled`] when it was killed.
    fn run(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: Option<&Path>,
        cancel: &CancelToken,
    ) -> Result<Output>;
}

/// Executes commands on the host system.
///
/// # Examples
///
/// ```no_run
/// use nvup_common::CancelToken;
/// use nvup_installer::source_build::{CommandExecutor, SystemCommandExecutor};
///
/// let output = SystemCommandExecutor.run("git", &["--version"], None, &CancelToken::new())?;
/// assert!(output.status.success());
/// # Ok::<(), nvup_installer::error::InstallerError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: Option<&Path>,
        cancel: &CancelToken,
    ) -> Result<Output> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        debug!("running {cmd} {}", args.join(" "));

        let mut child = command.spawn()?;
        // Drain both pipes concurrently so a chatty build cannot fill one and
        // stall.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
                break status;
            }
            if let Err(cancelled) = cancel.check() {
                kill(&mut child);
                return Err(cancelled.into());
            }
        };

        Ok(Output {
            status,
            stdout: join(stdout),
            stderr: join(stderr),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            buffer
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Result of a source build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// The populated install prefix.
    pub prefix: PathBuf,
    /// Full hash of the commit that was built.
    pub commit: String,
}

/// Builds and installs the editor from a source reference.
#[cfg_attr(test, mockall::automock)]
pub trait SourceBuilder {
    /// Build `reference` (a commit hash or `master`) and install it into
    /// `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Git`] when the checkout cannot be prepared
    /// and [`InstallerError::Build`] when compilation or installation fails.
    fn build_from_commit(
        &self,
        reference: &str,
        prefix: &Path,
        cancel: &CancelToken,
    ) -> Result<BuildOutput>;
}

/// [`SourceBuilder`] driving `git` and `make`.
pub struct GitSourceBuilder<'a> {
    executor: &'a dyn CommandExecutor,
    repo_url: String,
    checkout: PathBuf,
}

impl<'a> GitSourceBuilder<'a> {
    /// A builder cloning `repo_url` into `checkout`.
    #[must_use]
    pub fn new(
        executor: &'a dyn CommandExecutor,
        repo_url: impl Into<String>,
        checkout: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            repo_url: repo_url.into(),
            checkout: checkout.into(),
        }
    }

    fn git(&self, operation: &'static str, args: &[&str], cancel: &CancelToken) -> Result<Output> {
        let cwd = self.checkout.exists().then_some(self.checkout.as_path());
        let output = self
            .executor
            .run("git", args, cwd, &cancel.child_with_timeout(GIT_TIMEOUT))
            .map_err(|err| {
                timed_out_as(err, |message| InstallerError::Git { operation, message })
            })?;
        if !output.status.success() {
            return Err(InstallerError::Git {
                operation,
                message: stderr_of(&output),
            });
        }
        Ok(output)
    }

    fn make(&self, reference: &str, args: &[&str], cancel: &CancelToken) -> Result<()> {
        let output = self
            .executor
            .run(
                "make",
                args,
                Some(self.checkout.as_path()),
                &cancel.child_with_timeout(BUILD_TIMEOUT),
            )
            .map_err(|err| {
                timed_out_as(err, |reason| InstallerError::Build {
                    reference: reference.to_owned(),
                    reason,
                })
            })?;
        if !output.status.success() {
            return Err(InstallerError::Build {
                reference: reference.to_owned(),
                reason: stderr_of(&output),
            });
        }
        Ok(())
    }

    fn prepare_checkout(&self, cancel: &CancelToken) -> Result<()> {
        if self.checkout.join(".git").is_dir() {
            info!("updating source checkout");
            self.git("fetch", &["fetch", "--tags", "--force", "origin"], cancel)?;
            return Ok(());
        }
        if let Some(parent) = self.checkout.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| InstallerError::fs("create", parent, source))?;
        }
        info!("cloning {}", self.repo_url);
        let target = self.checkout.to_string_lossy();
        self.git("clone", &["clone", &self.repo_url, &target], cancel)?;
        Ok(())
    }
}

impl SourceBuilder for GitSourceBuilder<'_> {
    fn build_from_commit(
        &self,
        reference: &str,
        prefix: &Path,
        cancel: &CancelToken,
    ) -> Result<BuildOutput> {
        self.prepare_checkout(cancel)?;

        let revision = checkout_revision(reference);
        self.git("checkout", &["checkout", "--force", "--detach", &revision], cancel)?;
        let head = self.git("rev-parse", &["rev-parse", "HEAD"], cancel)?;
        let commit = String::from_utf8_lossy(&head.stdout).trim().to_owned();

        info!("building {reference} ({commit})");
        let prefix_arg = format!("CMAKE_INSTALL_PREFIX={}", prefix.display());
        self.make(reference, &["CMAKE_BUILD_TYPE=Release", &prefix_arg], cancel)?;
        self.make(reference, &["install", &prefix_arg], cancel)?;

        Ok(BuildOutput {
            prefix: prefix.to_path_buf(),
            commit,
        })
    }
}

/// The git revision to check out for `reference`.
///
/// `master` tracks the remote branch; anything else is used as given.
fn checkout_revision(reference: &str) -> String {
    if reference == "master" {
        "origin/master".to_owned()
    } else {
        reference.to_owned()
    }
}

/// Report a deadline expiry as a failure of the operation; explicit
/// cancellation passes through.
fn timed_out_as(
    err: InstallerError,
    wrap: impl FnOnce(String) -> InstallerError,
) -> InstallerError {
    match err {
        InstallerError::Cancelled(nvup_common::Cancelled::DeadlineExceeded) => {
            wrap("timed out".to_owned())
        }
        other => other,
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_owned()
}
