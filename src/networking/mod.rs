use std::time::Duration;

use log::debug;
use reqwest::{Client, Response, Url};

use crate::error::{DeployError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Plain GET client for manifests and deployed files.
#[derive(Clone)]
pub struct NetworkClient {
    client: Client,
}

impl NetworkClient {
    /// # Errors
    /// [`DeployError::HttpClient`] when the HTTP stack cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeployError::HttpClient)?;
        debug!("network client: request timeout {}s", timeout.as_secs());
        Ok(Self { client })
    }

    /// Fetch a whole document body. Non-success statuses are errors.
    pub async fn fetch_document(&self, url: &Url) -> Result<Vec<u8>> {
        debug!("network: GET {url}");
        let response = self.get_stream(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeployError::fetch(url, e))?;
        debug!("network: {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Open a GET whose body the caller consumes incrementally.
    pub async fn get_stream(&self, url: &Url) -> Result<Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DeployError::fetch(url, e))?
            .error_for_status()
            .map_err(|e| DeployError::fetch(url, e))
    }
}
