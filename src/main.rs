use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use log::{debug, info, warn};

mod config;
mod digest;
mod downloader;
mod engine;
mod error;
mod manifest;
mod networking;
mod paths;
mod progress;
mod util;

use crate::config::{DownloadOptions, RunConfig};
use crate::engine::DeploymentEngine;
use crate::progress::{NoProgress, ProgressSink, TerminalProgress};

#[derive(Parser, Debug)]
#[command(
    name = "clickonce-fetch",
    author,
    version,
    about = "Downloads files referenced from a ClickOnce .application file and verifies their digests"
)]
struct Cli {
    /// URL of the `.application` deployment descriptor.
    url: Option<String>,

    /// Directory the deployed files are written into.
    download_path: Option<String>,

    /// Number of files downloaded at once after the main assembly.
    #[arg(long, default_value = "1")]
    jobs: NonZeroUsize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Also fail when a file's byte count differs from the manifest's size.
    #[arg(long)]
    verify_size: bool,

    /// Write each file to a temporary name and rename it once verified.
    #[arg(long)]
    atomic: bool,

    /// Hide progress bars.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match RunConfig::new(cli.url.as_deref(), cli.download_path.as_deref()) {
        Ok(config) => config
            .with_jobs(cli.jobs)
            .with_timeout(Duration::from_secs(cli.timeout))
            .with_options(DownloadOptions {
                verify_size: cli.verify_size,
                atomic: cli.atomic,
            }),
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let cancel_flag = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&cancel_flag);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let progress: Box<dyn ProgressSink> = if cli.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(TerminalProgress::new())
    };

    let engine = match DeploymentEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    match engine.run(progress.as_ref(), Some(cancel_flag)).await {
        Ok(summary) => {
            for file in &summary.files {
                debug!(
                    "{} {} ({})",
                    file.digest,
                    file.path.display(),
                    util::format_size(file.bytes)
                );
            }
            info!(
                "downloaded {} files from {}",
                summary.files.len(),
                summary.manifest_url
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
