//! Shared test utilities for the installer crate.
//!
//! Archive builders produce release-shaped tarballs and zips in memory, and
//! the stubs stand in for the network and for external commands.

#![allow(
    clippy::expect_used,
    clippy::missing_panics_doc,
    reason = "test helpers fail loudly"
)]

use crate::download::{ChunkObserver, DownloadError, Downloader, copy_with_progress};
use crate::error::{InstallerError, Result};
use crate::release::{Asset, Release, ReleaseSource};
use crate::source_build::CommandExecutor;
use chrono::{DateTime, Utc};
use nvup_common::CancelToken;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Write};
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// An expected command invocation.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The program, e.g. `git`.
    pub cmd: &'static str,
    /// Exact arguments.
    pub args: Vec<String>,
    /// Working directory the call must run in, if checked.
    pub cwd: Option<String>,
    /// The result to return.
    pub result: Result<Output>,
}

impl ExpectedCall {
    /// A successful call of `cmd` with `args`.
    pub fn ok(cmd: &'static str, args: &[&str]) -> Self {
        Self {
            cmd,
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            cwd: None,
            result: Ok(success_output()),
        }
    }

    /// A call of `cmd` with `args` that exits non-zero with `stderr`.
    pub fn failing(cmd: &'static str, args: &[&str], stderr: &str) -> Self {
        Self {
            result: Ok(failure_output(stderr)),
            ..Self::ok(cmd, args)
        }
    }

    /// Require the call to run in `cwd`.
    #[must_use]
    pub fn in_dir(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// A command runner replaying scripted results in order.
///
/// An optional side effect runs for every call, letting tests emulate what
/// a build leaves behind.
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
    effect: Option<Box<dyn Fn(&str, &[&str])>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
            effect: None,
        }
    }

    /// Run `effect` for every successful invocation.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn(&str, &[&str]) + 'static) -> Self {
        self.effect = Some(Box::new(effect));
        self
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            self.expected.borrow().is_empty(),
            "expected no further command invocations"
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: Option<&Path>,
        _cancel: &CancelToken,
    ) -> Result<Output> {
        let call = self
            .expected
            .borrow_mut()
            .pop_front()
            .expect("unexpected command invocation");

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args, args);
        if let Some(expected_cwd) = &call.cwd {
            let actual = cwd.map(|p| p.to_string_lossy().into_owned());
            assert_eq!(actual.as_deref(), Some(expected_cwd.as_str()));
        }

        if matches!(&call.result, Ok(output) if output.status.success()) {
            if let Some(effect) = &self.effect {
                effect(cmd, args);
            }
        }
        call.result
    }
}

/// One entry of an archive built in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// A directory.
    Dir(String),
    /// A regular file with contents and permission bits.
    File(String, Vec<u8>, u32),
    /// A symbolic link and its verbatim target.
    Symlink(String, String),
}

impl ArchiveEntry {
    /// A directory entry.
    pub fn dir(path: &str) -> Self {
        Self::Dir(path.to_owned())
    }

    /// A regular file entry.
    pub fn file(path: &str, contents: &[u8], mode: u32) -> Self {
        Self::File(path.to_owned(), contents.to_vec(), mode)
    }

    /// A symlink entry.
    pub fn symlink(path: &str, target: &str) -> Self {
        Self::Symlink(path.to_owned(), target.to_owned())
    }
}

/// Build a gzip-compressed tarball.
pub fn tar_gz_bytes(entries: &[ArchiveEntry]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        match entry {
            ArchiveEntry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder
                    .append_data(&mut header, path, std::io::empty())
                    .expect("append dir");
            }
            ArchiveEntry::File(path, contents, mode) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(contents.len() as u64);
                builder
                    .append_data(&mut header, path, contents.as_slice())
                    .expect("append file");
            }
            ArchiveEntry::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder
                    .append_link(&mut header, path, target)
                    .expect("append symlink");
            }
        }
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Build a tarball with a single file whose header path is written raw,
/// bypassing the builder's own path checks.
pub fn tar_gz_with_raw_path(path: &str, contents: &[u8]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_old();
    {
        let name = &mut header.as_old_mut().name;
        name[..path.len()].copy_from_slice(path.as_bytes());
    }
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(contents.len() as u64);
    header.set_cksum();
    builder.append(&header, contents).expect("append raw entry");
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// Build a zip archive.
pub fn zip_bytes(entries: &[ArchiveEntry]) -> Vec<u8> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        match entry {
            ArchiveEntry::Dir(path) => {
                let options = SimpleFileOptions::default().unix_permissions(0o755);
                writer.add_directory(path.as_str(), options).expect("add dir");
            }
            ArchiveEntry::File(path, contents, mode) => {
                let options = SimpleFileOptions::default().unix_permissions(*mode);
                writer.start_file(path.as_str(), options).expect("start file");
                writer.write_all(contents).expect("write file");
            }
            ArchiveEntry::Symlink(path, target) => {
                let options = SimpleFileOptions::default();
                writer
                    .add_symlink(path.as_str(), target.as_str(), options)
                    .expect("add symlink");
            }
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// A release-shaped tarball: `<top>/bin/nvim` printing `marker`, plus a
/// runtime file.
pub fn nvim_tarball(top: &str, marker: &str) -> Vec<u8> {
    tar_gz_bytes(&nvim_entries(top, marker))
}

/// The entries of [`nvim_tarball`].
pub fn nvim_entries(top: &str, marker: &str) -> Vec<ArchiveEntry> {
    let script = format!("#!/bin/sh\necho {marker}\n");
    vec![
        ArchiveEntry::dir(&format!("{top}/")),
        ArchiveEntry::dir(&format!("{top}/bin/")),
        ArchiveEntry::file(&format!("{top}/bin/nvim"), script.as_bytes(), 0o755),
        ArchiveEntry::dir(&format!("{top}/share/nvim/runtime/")),
        ArchiveEntry::file(
            &format!("{top}/share/nvim/runtime/marker.txt"),
            marker.as_bytes(),
            0o644,
        ),
    ]
}

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state.to_le_bytes()[0]
        })
        .collect()
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Clone)]
enum Served {
    Body(Vec<u8>),
    NotFound,
    Broken(String),
}

/// A [`Downloader`] serving canned bodies by URL.
///
/// Bodies are streamed through [`copy_with_progress`], so cancellation and
/// progress behave as they do for real downloads. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct StubDownloader {
    routes: Mutex<HashMap<String, Served>>,
    calls: Mutex<Vec<String>>,
}

impl StubDownloader {
    /// An empty stub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`.
    #[must_use]
    pub fn serve(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.set(url, Served::Body(body.into()));
        self
    }

    /// Answer requests for `url` with a transport failure.
    #[must_use]
    pub fn broken(self, url: &str, reason: &str) -> Self {
        self.set(url, Served::Broken(reason.to_owned()));
        self
    }

    /// Answer requests for `url` with 404.
    #[must_use]
    pub fn missing(self, url: &str) -> Self {
        self.set(url, Served::NotFound);
        self
    }

    /// Replace the body served at `url`.
    pub fn set_body(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.set(url, Served::Body(body.into()));
    }

    /// Number of requests made for `url`.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| *c == url)
            .count()
    }

    /// Total number of requests made.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    fn set(&self, url: &str, served: Served) {
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url.to_owned(), served);
    }

    fn lookup(&self, url: &str) -> Served {
        self.calls.lock().expect("calls lock").push(url.to_owned());
        self.routes
            .lock()
            .expect("routes lock")
            .get(url)
            .cloned()
            .unwrap_or(Served::NotFound)
    }
}

impl Downloader for StubDownloader {
    fn fetch_text(
        &self,
        url: &str,
        cancel: &CancelToken,
    ) -> std::result::Result<String, DownloadError> {
        let mut body = Vec::new();
        self.fetch_to_writer(url, &mut body, cancel, &mut |_, _| {})?;
        String::from_utf8(body).map_err(|e| DownloadError::HttpError {
            url: url.to_owned(),
            reason: e.to_string(),
        })
    }

    fn fetch_to_writer(
        &self,
        url: &str,
        dest: &mut dyn Write,
        cancel: &CancelToken,
        on_chunk: &mut ChunkObserver<'_>,
    ) -> std::result::Result<u64, DownloadError> {
        cancel.check()?;
        match self.lookup(url) {
            Served::Body(body) => {
                let total = Some(body.len() as u64);
                copy_with_progress(url, &mut Cursor::new(body), dest, cancel, total, on_chunk)
            }
            Served::NotFound => Err(DownloadError::NotFound {
                url: url.to_owned(),
            }),
            Served::Broken(reason) => Err(DownloadError::HttpError {
                url: url.to_owned(),
                reason,
            }),
        }
    }
}

/// A [`ReleaseSource`] returning a fixed list and counting fetches.
#[derive(Debug, Default)]
pub struct StubReleaseSource {
    releases: Mutex<Vec<Release>>,
    fetches: AtomicUsize,
    fail: bool,
}

impl StubReleaseSource {
    /// A source answering with `releases`.
    pub fn new(releases: Vec<Release>) -> Self {
        Self {
            releases: Mutex::new(releases),
            ..Self::default()
        }
    }

    /// A source whose every fetch fails.
    pub fn unreachable() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Replace the list returned by later fetches.
    pub fn set_releases(&self, releases: Vec<Release>) {
        *self.releases.lock().expect("releases lock") = releases;
    }

    /// Number of fetches performed.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for StubReleaseSource {
    fn fetch_releases(&self) -> Result<Vec<Release>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InstallerError::ReleaseList {
                url: "stub://releases".to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        Ok(self.releases.lock().expect("releases lock").clone())
    }
}

/// Base URL used for stub release assets.
pub const STUB_ASSET_BASE: &str = "https://stub.test/download";

/// A release carrying the Linux x86-64 tarball and its `.sha256sum` file.
pub fn release(tag: &str, prerelease: bool) -> Release {
    let asset = "nvim-linux-x86_64.tar.gz";
    let url = |name: &str| format!("{STUB_ASSET_BASE}/{tag}/{name}");
    Release {
        tag: tag.to_owned(),
        is_prerelease: prerelease,
        assets: vec![
            Asset {
                name: asset.to_owned(),
                download_url: url(asset),
                size: 0,
            },
            Asset {
                name: format!("{asset}.sha256sum"),
                download_url: url(&format!("{asset}.sha256sum")),
                size: 0,
            },
        ],
        published_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0),
        source_commit: None,
    }
}

/// A nightly release built from `commit`.
pub fn nightly_release(commit: &str) -> Release {
    Release {
        source_commit: Some(commit.to_owned()),
        ..release("nightly", true)
    }
}

/// Serve a release's Linux tarball and a matching checksum file.
pub fn serve_release(downloader: &StubDownloader, release: &Release, marker: &str) {
    let archive = nvim_tarball("nvim-linux-x86_64", marker);
    let digest = sha256_hex(&archive);
    for asset in &release.assets {
        if asset.name.ends_with(".sha256sum") {
            downloader.set_body(
                &asset.download_url,
                format!("{digest}  nvim-linux-x86_64.tar.gz\n"),
            );
        } else {
            downloader.set_body(&asset.download_url, archive.clone());
        }
    }
}
