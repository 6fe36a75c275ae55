//! Upstream release list retrieval.

use super::Release;
use crate::download::{http_agent, map_ureq_error};
use crate::error::{InstallerError, Result};
use log::debug;
use std::time::Duration;

/// Releases requested per API page; upstream keeps fewer than this.
const PAGE_SIZE: u32 = 100;

/// Timeout for the release list request.
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable holding an optional API token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Trait for fetching the full upstream release list, newest first.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseSource {
    /// Fetch every published release.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::ReleaseList`] when the list cannot be
    /// fetched or decoded.
    fn fetch_releases(&self) -> Result<Vec<Release>>;
}

/// Release list from the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubReleaseSource {
    url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl GitHubReleaseSource {
    /// A source reading from `url`, e.g.
    /// `https://api.github.com/repos/neovim/neovim/releases`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            agent: http_agent(LIST_TIMEOUT),
        }
    }

    /// Authenticate requests with `token`, raising the API rate limit.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// A source that picks up an API token from [`TOKEN_ENV`] when set.
    #[must_use]
    pub fn from_env(url: impl Into<String>) -> Self {
        Self::new(url).with_token(std::env::var(TOKEN_ENV).ok())
    }

    fn list_error(&self, reason: impl ToString) -> InstallerError {
        InstallerError::ReleaseList {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

impl ReleaseSource for GitHubReleaseSource {
    fn fetch_releases(&self) -> Result<Vec<Release>> {
        let url = format!("{}?per_page={PAGE_SIZE}", self.url);
        debug!("fetching release list from {url}");

        let mut request = self
            .agent
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        let response = request
            .call()
            .map_err(|e| self.list_error(map_ureq_error(&url, &e)))?;
        let body = std::io::read_to_string(response.into_body().into_reader())
            .map_err(|e| self.list_error(e))?;
        let releases: Vec<Release> =
            serde_json::from_str(&body).map_err(|e| self.list_error(e))?;
        debug!("fetched {} releases", releases.len());
        Ok(releases)
    }
}
