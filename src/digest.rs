//! Content digests
//!
//! A [`Digest`] is the content address of a blob or manifest: an algorithm name
//! plus the lowercase hex encoding of the hash. The canonical string form is
//! `sha256:<64 hex chars>`, which is what registries expect in URLs and
//! manifests and what the resource reports as its version.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest as _;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Standard SHA256 digest for empty files/layers
pub const EMPTY_SHA256_HEX: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const SHA256: &str = "sha256";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("digest '{0}' is missing the algorithm prefix")]
    MissingAlgorithm(String),
    #[error("unsupported digest algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("invalid sha256 hex '{0}': expected 64 lowercase hex characters")]
    InvalidHex(String),
}

/// Algorithm-prefixed content hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Compute the sha256 digest of `data`
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = sha2::Sha256::new();
        hasher.update(data);
        Self {
            algorithm: SHA256.to_string(),
            hex: hex::encode(hasher.finalize()),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Truncated form for log lines
    pub fn short(&self) -> String {
        format!("{}:{}", self.algorithm, &self.hex[..12.min(self.hex.len())])
    }

    pub fn is_valid_sha256_hex(hex: &str) -> bool {
        hex.len() == 64 && hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| DigestError::MissingAlgorithm(s.to_string()))?;

        if algorithm != SHA256 {
            return Err(DigestError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        if !Self::is_valid_sha256_hex(hex) {
            return Err(DigestError::InvalidHex(hex.to_string()));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
