use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::{Response, Url};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::config::DownloadOptions;
use crate::engine::models::{DownloadReport, FileEntry};
use crate::error::{DeployError, Result};
use crate::networking::NetworkClient;
use crate::paths::{deploy_url, destination_path, to_fs_path};
use crate::progress::{ProgressSink, Tracker};
use crate::util::cancel_requested;

const PARTIAL_SUFFIX: &str = ".partial";

/// Downloads manifest entries into a directory, verifying each digest.
pub struct Downloader<'a> {
    client: &'a NetworkClient,
    root: &'a Path,
    manifest_url: &'a Url,
    options: DownloadOptions,
}

impl<'a> Downloader<'a> {
    pub fn new(
        client: &'a NetworkClient,
        root: &'a Path,
        manifest_url: &'a Url,
        options: DownloadOptions,
    ) -> Self {
        Self {
            client,
            root,
            manifest_url,
            options,
        }
    }

    /// Fetch `entry` from `<manifest dir>/<path>.deploy` into `<root>/<path>`.
    ///
    /// On a digest mismatch the written file is left in place unless atomic
    /// writes are enabled.
    pub async fn download(
        &self,
        entry: &FileEntry,
        progress: &dyn ProgressSink,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<DownloadReport> {
        if cancel_requested(cancel) {
            return Err(DeployError::Cancelled);
        }
        let source = deploy_url(self.manifest_url, &entry.relative_path)?;
        let dest = destination_path(self.root, &entry.relative_path)?;
        let write_path = if self.options.atomic {
            partial_path(&dest)
        } else {
            dest.clone()
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DeployError::io(parent, e))?;
        }

        debug!("download: {} {source} -> {}", entry.kind, dest.display());
        let response = self.client.get_stream(&source).await?;
        let label = to_fs_path(&entry.relative_path).display().to_string();
        let tracker = progress.start(&label, entry.declared_size);

        let streamed = stream_to_file(
            response,
            &source,
            &write_path,
            entry,
            tracker.as_ref(),
            cancel,
        )
        .await;
        let result = streamed.and_then(|(actual, received)| {
            if actual != entry.digest {
                return Err(DeployError::Verification {
                    path: dest.clone(),
                    expected: entry.digest.clone(),
                    actual,
                });
            }
            if self.options.verify_size && received != entry.declared_size {
                return Err(DeployError::SizeMismatch {
                    path: dest.clone(),
                    declared: entry.declared_size,
                    received,
                });
            }
            Ok(DownloadReport {
                path: dest.clone(),
                bytes: received,
                digest: actual,
            })
        });

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                tracker.abandon();
                if self.options.atomic || matches!(err, DeployError::Cancelled) {
                    discard(&write_path).await;
                }
                return Err(err);
            }
        };

        if self.options.atomic
            && let Err(err) = fs::rename(&write_path, &dest).await
        {
            tracker.abandon();
            discard(&write_path).await;
            return Err(DeployError::io(&dest, err));
        }
        tracker.finish();
        info!(
            "download: verified {} ({} bytes, {:?})",
            dest.display(),
            report.bytes,
            entry.algorithm
        );
        Ok(report)
    }
}

/// Stream the body into `path`, hashing as it goes. Returns the base64 digest
/// and the number of bytes received.
async fn stream_to_file(
    response: Response,
    source: &Url,
    path: &Path,
    entry: &FileEntry,
    tracker: &dyn Tracker,
    cancel: &Option<Arc<AtomicBool>>,
) -> Result<(String, u64)> {
    let mut file = File::create(path)
        .await
        .map_err(|e| DeployError::io(path, e))?;
    let mut hasher = entry.algorithm.hasher();
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if cancel_requested(cancel) {
            return Err(DeployError::Cancelled);
        }
        let chunk = chunk.map_err(|e| DeployError::fetch(source, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DeployError::io(path, e))?;
        hasher.update(&chunk);
        received += chunk.len() as u64;
        tracker.step(chunk.len() as u64);
    }
    if cancel_requested(cancel) {
        return Err(DeployError::Cancelled);
    }
    file.flush().await.map_err(|e| DeployError::io(path, e))?;

    Ok((hasher.finalize_base64(), received))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

async fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        warn!("download: could not remove {}: {err}", path.display());
    }
}
