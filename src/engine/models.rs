use std::fmt;
use std::path::PathBuf;

use reqwest::Url;

use crate::digest::DigestAlgorithm;

/// Pointer from the `.application` file to the versioned deployment manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestReference {
    pub relative_path: String,
    pub digest: String,
    pub algorithm: DigestAlgorithm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// The install-type dependent assembly.
    Assembly,
    File,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryKind::Assembly => "assembly",
            EntryKind::File => "file",
        })
    }
}

/// One downloadable artefact declared by the deployment manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub relative_path: String,
    /// As stated by the manifest; drives progress display.
    pub declared_size: u64,
    pub digest: String,
    pub algorithm: DigestAlgorithm,
    pub kind: EntryKind,
}

#[derive(Clone, Debug)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub digest: String,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub manifest_url: Url,
    pub files: Vec<DownloadReport>,
}

impl RunSummary {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}
