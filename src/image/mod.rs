//! Image handles
//!
//! The orchestrator only sees the [`Image`] trait: a digest, the manifest
//! bytes, and the blobs the registry needs. [`TarballImage`] is the loader for
//! `docker save` archives.

pub mod manifest;
pub mod tarball;

use crate::digest::Digest;
use crate::error::ImageError;

pub use manifest::{Descriptor, Manifest};
pub use tarball::TarballImage;

/// A content-addressed blob held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub digest: Digest,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            digest: Digest::sha256(&data),
            media_type: media_type.into(),
            data,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn descriptor(&self) -> Descriptor {
        Descriptor {
            media_type: self.media_type.clone(),
            size: self.size(),
            digest: self.digest.clone(),
        }
    }
}

/// An immutable image that can be pushed to any number of references
pub trait Image: Send + Sync {
    /// Digest of the manifest, the identity of the image
    fn digest(&self) -> Result<Digest, ImageError>;

    fn manifest_bytes(&self) -> Result<&[u8], ImageError>;

    fn manifest_media_type(&self) -> &str;

    /// Every blob the manifest references, layers first, config last
    fn blobs(&self) -> Vec<&Blob>;
}
