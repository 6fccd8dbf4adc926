//! Translation of the backslash-delimited paths found in ClickOnce manifests.

use std::path::{Component, Path, PathBuf};

use reqwest::Url;

use crate::error::{DeployError, Result};

/// Suffix the publisher appends to every deployed file on the server.
pub const DEPLOY_SUFFIX: &str = ".deploy";

/// `Sub\App.manifest` -> `Sub/App.manifest`
#[must_use]
pub fn to_url_path(relative: &str) -> String {
    relative.split('\\').collect::<Vec<_>>().join("/")
}

/// `Sub\App.manifest` -> `Sub/App.manifest` on unix, unchanged on windows.
#[must_use]
pub fn to_fs_path(relative: &str) -> PathBuf {
    relative.split('\\').collect()
}

/// Resolve a manifest-relative path against `base` using URL semantics.
///
/// `#` and `?` are part of the file name here, not a fragment or query.
pub fn resolve(base: &Url, relative: &str) -> Result<Url> {
    let path = to_url_path(relative)
        .replace('#', "%23")
        .replace('?', "%3F");
    base.join(&path).map_err(|err| DeployError::InvalidUrl {
        url: format!("{base} + {path}"),
        reason: err.to_string(),
    })
}

/// Where the server keeps the bytes for `relative`.
///
/// Entries must stay beside the manifest: a scheme-like first segment
/// (`C:`, `http:`) or a leading separator is rejected as malformed.
pub fn deploy_url(manifest_url: &Url, relative: &str) -> Result<Url> {
    let path = to_url_path(relative);
    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() || first.contains(':') {
        return Err(DeployError::malformed(format!(
            "entry path {relative:?} is not relative to the manifest"
        )));
    }
    let mut url = resolve(manifest_url, relative)?;
    let path = format!("{}{DEPLOY_SUFFIX}", url.path());
    url.set_path(&path);
    Ok(url)
}

/// Where `relative` lands under `root`.
///
/// Entries that would escape the download root (`..`, rooted or drive-prefixed
/// paths) are rejected as malformed.
pub fn destination_path(root: &Path, relative: &str) -> Result<PathBuf> {
    let translated = to_fs_path(relative);
    let mut has_name = false;
    for component in translated.components() {
        match component {
            Component::Normal(_) => has_name = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(DeployError::malformed(format!(
                    "entry path {relative:?} escapes the download directory"
                )));
            }
        }
    }
    if !has_name {
        return Err(DeployError::malformed(format!(
            "entry path {relative:?} does not name a file"
        )));
    }
    Ok(root.join(translated))
}
