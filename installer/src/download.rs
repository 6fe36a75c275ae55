//! HTTP downloads for release metadata and archives.
//!
//! Provides a trait-based abstraction over HTTP so the install pipeline and
//! the release resolver can be exercised without network access.

use log::debug;
use nvup_common::{CancelToken, Cancelled};
use std::io::{Read, Write};
use std::time::Duration;

/// Default network timeout for a single download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Read buffer used while streaming a download.
const CHUNK_SIZE: usize = 64 * 1024;

/// Receives `(bytes_so_far, total_if_known)` after each chunk.
pub type ChunkObserver<'a> = dyn FnMut(u64, Option<u64>) + 'a;

/// Trait for fetching remote resources.
///
/// # Examples
///
/// ```no_run
/// use nvup_common::CancelToken;
/// use nvup_installer::download::{Downloader, HttpDownloader};
///
/// let downloader = HttpDownloader::default();
/// let text = downloader.fetch_text("https://example.com/shasum.txt", &CancelToken::new())?;
/// # Ok::<(), nvup_installer::download::DownloadError>(())
/// ```
pub trait Downloader {
    /// Fetch a small text resource such as a checksum file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotFound`] on HTTP 404,
    /// [`DownloadError::Cancelled`] if `cancel` fires, and
    /// [`DownloadError::HttpError`] for any other failure.
    fn fetch_text(&self, url: &str, cancel: &CancelToken) -> Result<String, DownloadError>;

    /// Stream a resource into `dest`, reporting progress after each chunk.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// As for [`Self::fetch_text`], plus [`DownloadError::Io`] when writing
    /// to `dest` fails.
    fn fetch_to_writer(
        &self,
        url: &str,
        dest: &mut dyn Write,
        cancel: &CancelToken,
        on_chunk: &mut ChunkObserver<'_>,
    ) -> Result<u64, DownloadError>;
}

/// Errors arising from download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested resource was not found (HTTP 404).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded data.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),

    /// The download was cancelled mid-stream.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// HTTP downloader using a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    /// A downloader whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
        }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_TIMEOUT)
    }
}

impl Downloader for HttpDownloader {
    fn fetch_text(&self, url: &str, cancel: &CancelToken) -> Result<String, DownloadError> {
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
    ) -> Result<u64, DownloadError> {
        cancel.check()?;
        debug!("GET {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let total = response.body().content_length();
        let mut reader = response.into_body().into_reader();
        copy_with_progress(url, &mut reader, dest, cancel, total, on_chunk)
    }
}

/// Copy `reader` into `dest` in chunks, checking `cancel` between chunks.
///
/// # Errors
///
/// Returns [`DownloadError::Cancelled`] when `cancel` fires,
/// [`DownloadError::HttpError`] when reading from `url` fails, and
/// [`DownloadError::Io`] when writing to `dest` fails.
pub fn copy_with_progress(
    url: &str,
    reader: &mut dyn Read,
    dest: &mut dyn Write,
    cancel: &CancelToken,
    total: Option<u64>,
    on_chunk: &mut ChunkObserver<'_>,
) -> Result<u64, DownloadError> {
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut written = 0_u64;
    loop {
        cancel.check()?;
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(DownloadError::HttpError {
                    url: url.to_owned(),
                    reason: err.to_string(),
                });
            }
        };
        dest.write_all(&buffer[..read])?;
        written += read as u64;
        on_chunk(written, total);
    }
    dest.flush()?;
    Ok(written)
}

/// Build a `ureq` agent with a global request timeout.
pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Map a ureq error to a [`DownloadError`].
pub(crate) fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
