//! Request envelope for the out step
//!
//! The resource reads one JSON object from stdin:
//! `{"source": {...}, "params": {...}}`. Decoding is strict; any field the
//! resource does not know about is a decode error.

use crate::error::OutError;
use crate::plan::TagSource;
use crate::reference::DEFAULT_TAG;
use crate::registry::Credentials;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutRequest {
    pub source: Source,
    pub params: PutParams,
}

impl OutRequest {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, OutError> {
        serde_json::from_reader(reader).map_err(OutError::RequestDecode)
    }
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Source {
    pub repository: String,

    #[serde(default, rename = "tag", deserialize_with = "deserialize_tag")]
    pub raw_tag: Option<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub content_trust: Option<ContentTrust>,
}

impl Source {
    /// Configured tag, `latest` when unset or empty
    pub fn tag(&self) -> String {
        match self.raw_tag.as_deref() {
            Some(tag) if !tag.is_empty() => tag.to_string(),
            _ => DEFAULT_TAG.to_string(),
        }
    }

    /// `repository:tag`
    pub fn name(&self) -> String {
        format!("{}:{}", self.repository, self.tag())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }

    pub fn content_trust_enabled(&self) -> bool {
        self.content_trust.as_ref().is_some_and(|ct| ct.enable)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("repository", &self.repository)
            .field("tag", &self.raw_tag)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("debug", &self.debug)
            .field("content_trust", &self.content_trust)
            .finish()
    }
}

/// Tags may be written as strings or bare numbers (`tag: 3.2`)
fn deserialize_tag<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTag {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<RawTag>::deserialize(deserializer)?.map(|raw| match raw {
        RawTag::Text(text) => text,
        RawTag::Number(number) => number.to_string(),
    }))
}

/// Notary settings for content trust signing
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentTrust {
    pub enable: bool,
    pub server: String,
    pub repository_key_id: String,
    pub repository_key: String,
    pub repository_passphrase: String,
    pub tls_key: String,
    pub tls_cert: String,
}

impl fmt::Debug for ContentTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTrust")
            .field("enable", &self.enable)
            .field("server", &self.server)
            .field("repository_key_id", &self.repository_key_id)
            .field("has_repository_key", &!self.repository_key.is_empty())
            .field("has_tls_cert", &!self.tls_cert.is_empty())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PutParams {
    /// Image tarball, relative to the destination directory
    pub image: String,

    #[serde(default)]
    pub additional_tags: Option<AdditionalTags>,
}

/// Either a path to a whitespace-separated tag file or a literal list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AdditionalTags {
    File(String),
    List(Vec<String>),
}

impl PutParams {
    pub fn image_path(&self, destination: &Path) -> PathBuf {
        destination.join(&self.image)
    }

    pub fn tag_source(&self, destination: &Path) -> TagSource {
        match &self.additional_tags {
            None => TagSource::None,
            Some(AdditionalTags::File(path)) if path.is_empty() => TagSource::None,
            Some(AdditionalTags::File(path)) => TagSource::File(destination.join(path)),
            Some(AdditionalTags::List(tags)) => TagSource::Literal(tags.clone()),
        }
    }
}
