use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::{DeployError, Result};
use crate::networking::DEFAULT_TIMEOUT;

/// Knobs for the verified downloader. The defaults match the classic
/// behaviour: digest-only verification, writing straight to the final path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    /// Also require the received byte count to equal the declared size.
    pub verify_size: bool,
    /// Write to a `.partial` sibling and rename once verified.
    pub atomic: bool,
}

/// Everything one pipeline run needs, validated before any network access.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub url: Url,
    pub download_path: PathBuf,
    pub jobs: NonZeroUsize,
    pub timeout: Duration,
    pub options: DownloadOptions,
}

impl RunConfig {
    /// # Errors
    /// [`DeployError::MissingArgument`] when either input is absent or empty,
    /// [`DeployError::InvalidUrl`] when the URL does not parse.
    pub fn new(url: Option<&str>, download_path: Option<&str>) -> Result<Self> {
        let url = url
            .filter(|s| !s.is_empty())
            .ok_or(DeployError::MissingArgument("url (arg1)"))?;
        let download_path = download_path
            .filter(|s| !s.is_empty())
            .ok_or(DeployError::MissingArgument("download_path (arg2)"))?;
        let url = Url::parse(url).map_err(|err| DeployError::InvalidUrl {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            url,
            download_path: PathBuf::from(download_path),
            jobs: NonZeroUsize::MIN,
            timeout: DEFAULT_TIMEOUT,
            options: DownloadOptions::default(),
        })
    }

    pub fn with_jobs(mut self, jobs: NonZeroUsize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }
}
