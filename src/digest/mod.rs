use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{DeployError, Result};

pub const XMLDSIG_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const XMLDSIG_SHA256: &str = "http://www.w3.org/2000/09/xmldsig#sha256";

/// Digest algorithms a ClickOnce manifest may declare for its entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// Map a `DigestMethod/@Algorithm` identifier onto a known algorithm.
    ///
    /// # Errors
    /// Returns [`DeployError::UnsupportedAlgorithm`] for any other identifier.
    pub fn from_identifier(identifier: &str) -> Result<Self> {
        match identifier {
            XMLDSIG_SHA256 => Ok(DigestAlgorithm::Sha256),
            XMLDSIG_SHA1 => Ok(DigestAlgorithm::Sha1),
            other => Err(DeployError::UnsupportedAlgorithm(other.to_owned())),
        }
    }

    pub fn identifier(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => XMLDSIG_SHA1,
            DigestAlgorithm::Sha256 => XMLDSIG_SHA256,
        }
    }

    /// A fresh accumulator; never share one between entries.
    pub fn hasher(self) -> DigestHasher {
        match self {
            DigestAlgorithm::Sha1 => DigestHasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => DigestHasher::Sha256(Sha256::new()),
        }
    }
}

/// Incremental hash state for one download.
pub enum DigestHasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl DigestHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestHasher::Sha1(h) => h.update(data),
            DigestHasher::Sha256(h) => h.update(data),
        }
    }

    /// Finish hashing and render the digest the way manifests store it.
    pub fn finalize_base64(self) -> String {
        match self {
            DigestHasher::Sha1(h) => STANDARD.encode(h.finalize()),
            DigestHasher::Sha256(h) => STANDARD.encode(h.finalize()),
        }
    }
}
