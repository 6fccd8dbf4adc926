use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures_util::StreamExt;
use futures_util::stream;
use log::{debug, info, warn};

use crate::config::RunConfig;
use crate::downloader::Downloader;
use crate::engine::models::{DownloadReport, RunSummary};
use crate::error::{DeployError, Result};
use crate::manifest;
use crate::networking::NetworkClient;
use crate::paths;
use crate::progress::ProgressSink;
use crate::util::{cancel_requested, format_size};

pub mod models;

/// Drives one resolution-and-download run for a `.application` URL.
pub struct DeploymentEngine {
    config: RunConfig,
    networking: NetworkClient,
}

impl DeploymentEngine {
    pub fn new(config: RunConfig) -> Result<Self> {
        let networking = NetworkClient::new(config.timeout)?;
        Ok(Self { config, networking })
    }

    /// Resolve the deployment manifest, then download and verify every entry.
    ///
    /// The primary install assembly is fetched before anything else; the
    /// remaining entries follow in document order, up to `jobs` at a time.
    /// The first failure ends the run and drops any download still in flight.
    pub async fn run(
        &self,
        progress: &dyn ProgressSink,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<RunSummary> {
        let config = &self.config;
        check_cancel(&cancel)?;

        info!("run: fetching application {}", config.url);
        let application = self.networking.fetch_document(&config.url).await?;
        let reference = manifest::parse_application(&application)?;
        let manifest_url = paths::resolve(&config.url, &reference.relative_path)?;
        debug!(
            "run: manifest digest {} ({}) recorded, not enforced",
            reference.digest,
            reference.algorithm.identifier()
        );

        check_cancel(&cancel)?;
        info!("run: fetching deployment manifest {manifest_url}");
        let document = self.networking.fetch_document(&manifest_url).await?;
        let entries = manifest::parse_deployment(&document)?;
        let Some((primary, rest)) = entries.split_first() else {
            return Err(DeployError::malformed("deployment manifest lists no entries"));
        };
        info!(
            "run: {} entries into {} ({} declared)",
            entries.len(),
            config.download_path.display(),
            format_size(entries.iter().map(|e| e.declared_size).sum())
        );

        let downloader = Downloader::new(
            &self.networking,
            &config.download_path,
            &manifest_url,
            config.options,
        );
        let mut files: Vec<DownloadReport> = Vec::with_capacity(entries.len());
        files.push(downloader.download(primary, progress, &cancel).await?);

        let downloader = &downloader;
        let cancel = &cancel;
        let mut pending = stream::iter(rest)
            .map(move |entry| downloader.download(entry, progress, cancel))
            .buffered(config.jobs.get());
        while let Some(report) = pending.next().await {
            match report {
                Ok(report) => files.push(report),
                Err(err) => {
                    warn!("run: stopping after {} verified files", files.len());
                    return Err(err);
                }
            }
        }
        drop(pending);

        let summary = RunSummary {
            manifest_url,
            files,
        };
        info!(
            "run: {} files verified ({})",
            summary.files.len(),
            format_size(summary.total_bytes())
        );
        Ok(summary)
    }
}

fn check_cancel(cancel: &Option<Arc<AtomicBool>>) -> Result<()> {
    if cancel_requested(cancel) {
        warn!("run: cancellation requested");
        return Err(DeployError::Cancelled);
    }
    Ok(())
}
