use std::sync::OnceLock;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

const PB_STYLE: &str = "{prefix:>10.cyan.bold} {wide_msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_STYLE: &str = "{prefix:>10.cyan.bold} {spinner:.blue} {wide_msg} {bytes} ({bytes_per_sec})";
const PB_CHARS: &str = "█▓▒░  ";

/// Receives per-file byte progress. Shared by every in-flight download.
pub trait ProgressSink: Send + Sync {
    /// Begin tracking a file whose manifest declares `total` bytes.
    fn start(&self, label: &str, total: u64) -> Box<dyn Tracker>;
}

pub trait Tracker: Send + Sync {
    fn step(&self, len: u64);
    fn finish(&self);
    /// Leave the tracker without marking it complete (failed or cancelled).
    fn abandon(&self);
}

/// Terminal progress bars, one line per file.
pub struct TerminalProgress {
    multi: MultiProgress,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style() -> Option<&'static ProgressStyle> {
    static STYLE: OnceLock<Option<ProgressStyle>> = OnceLock::new();
    STYLE
        .get_or_init(|| {
            ProgressStyle::with_template(PB_STYLE)
                .ok()
                .map(|style| style.progress_chars(PB_CHARS))
        })
        .as_ref()
}

fn spinner_style() -> Option<&'static ProgressStyle> {
    static STYLE: OnceLock<Option<ProgressStyle>> = OnceLock::new();
    STYLE
        .get_or_init(|| ProgressStyle::with_template(SPINNER_STYLE).ok())
        .as_ref()
}

impl ProgressSink for TerminalProgress {
    fn start(&self, label: &str, total: u64) -> Box<dyn Tracker> {
        // Some assemblies carry no size attribute.
        let (pb, style) = if total > 0 {
            (ProgressBar::new(total), bar_style())
        } else {
            (ProgressBar::new_spinner(), spinner_style())
        };
        let pb = match style {
            Some(style) => pb.with_style(style.clone()),
            None => pb,
        };
        let pb = self.multi.add(pb);
        pb.set_prefix("download");
        pb.set_message(label.to_owned());
        Box::new(BarTracker { pb })
    }
}

struct BarTracker {
    pb: ProgressBar,
}

impl Tracker for BarTracker {
    fn step(&self, len: u64) {
        self.pb.inc(len);
    }

    fn finish(&self) {
        self.pb.set_prefix("verified");
        self.pb.finish();
    }

    fn abandon(&self) {
        self.pb.set_prefix("failed");
        self.pb.abandon();
    }
}

/// Discards all progress, for `--quiet` runs.
#[derive(Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _label: &str, _total: u64) -> Box<dyn Tracker> {
        Box::new(NoProgress)
    }
}

impl Tracker for NoProgress {
    fn step(&self, _len: u64) {}
    fn finish(&self) {}
    fn abandon(&self) {}
}
