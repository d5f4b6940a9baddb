//! Error types for the out step
//!
//! [`OutError`] is the fatal taxonomy: any of its variants ends the run with a
//! non-zero exit. [`SigningError`] is a separate type: signing
//! failures are logged and collected, never propagated as fatal.

pub mod handlers;

use crate::plan::TagParseError;
use crate::reference::{Reference, ReferenceError};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OutError>;

/// Fatal errors, one variant per stage of the run
#[derive(Debug, Error)]
pub enum OutError {
    #[error("invalid payload: {0}")]
    RequestDecode(#[source] serde_json::Error),

    #[error("destination path not specified")]
    Argument,

    #[error("could not resolve repository/tag reference: {0}")]
    ReferenceSyntax(#[from] ReferenceError),

    #[error("could not parse additional tags: {0}")]
    TagParse(#[from] TagParseError),

    #[error("could not load image: {0}")]
    ImageRead(#[from] ImageError),

    #[error("failed to upload image to {reference}: {source}")]
    Push {
        reference: Reference,
        #[source]
        source: RegistryError,
    },

    #[error("failed to tag image with {tag}: {source}")]
    Tag {
        tag: String,
        reference: Reference,
        #[source]
        source: RegistryError,
    },
}

/// Problems reading the local image artifact
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid image archive: {0}")]
    Format(String),

    #[error("invalid image metadata: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connect,
    Timeout,
    /// Failure while sending or reading a request, e.g. a reset connection
    Request,
    /// The request could not be built or was rejected before it was sent
    Builder,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Builder => "builder",
            TransportErrorKind::Other => "transport",
        };
        f.write_str(name)
    }
}

/// A request that never produced a response
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Worth retrying: the failure says nothing about the request itself
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Connect | TransportErrorKind::Timeout | TransportErrorKind::Request
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_builder() {
            TransportErrorKind::Builder
        } else if err.is_request() || err.is_body() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Failures of a push against a registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{operation} failed (HTTP {status}): {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("registry protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Image(#[from] ImageError),
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        RegistryError::Transport(err.into())
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Protocol(format!("invalid URL: {}", err))
    }
}

/// Non-fatal failures of the content trust step
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("failed to prepare notary config dir: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("content trust is enabled but `{0}` is not configured")]
    MissingSetting(&'static str),

    #[error("cannot sign {0}: reference is not a tag")]
    Untagged(String),

    #[error("failed to read image manifest: {0}")]
    Image(#[from] ImageError),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("notary exited with {status}: {stderr}")]
    Notary { status: String, stderr: String },

    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },
}
