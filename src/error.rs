use std::path::PathBuf;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Everything that can stop a deployment download.
#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    /// A required input was not supplied.
    #[error("{0} is missing")]
    MissingArgument(&'static str),
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    /// The request failed or the server answered with a non-success status.
    #[error("request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The HTTP client could not be built with the requested settings.
    #[error("could not initialise HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Required XML structure or attribute is absent.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The downloaded bytes do not hash to the digest declared by the manifest.
    #[error(
        "error validating {} (downloaded digest {actual} doesn't match expected digest {expected})",
        path.display()
    )]
    Verification {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("size mismatch for {}: manifest declares {declared} bytes, received {received}", path.display())]
    SizeMismatch {
        path: PathBuf,
        declared: u64,
        received: u64,
    },
    #[error("filesystem operation on {} failed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download cancelled")]
    Cancelled,
}

impl DeployError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        DeployError::MalformedManifest(msg.into())
    }

    pub(crate) fn fetch(url: impl ToString, source: reqwest::Error) -> Self {
        DeployError::Fetch {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }
}
