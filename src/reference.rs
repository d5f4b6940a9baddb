//! Image references
//!
//! A reference names one image inside a repository: `host/path[:tag|@digest]`.
//! The grammar is `oci_client`'s, so `alpine` resolves to
//! `index.docker.io/library/alpine:latest` and `registry:5000/team/app:v1`
//! keeps its explicit registry host. This module adds what the push needs on
//! top: a comparable repository identity, the notary GUN and the schemes a
//! registry may be reached over.

use crate::digest::{Digest, DigestError};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

pub const DOCKER_HUB_REGISTRY: &str = "index.docker.io";
pub const DEFAULT_TAG: &str = "latest";

const HTTPS_ONLY: &[&str] = &["https"];
const HTTPS_THEN_HTTP: &[&str] = &["https", "http"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid reference '{input}': {kind}")]
pub struct ReferenceError {
    pub input: String,
    pub kind: ReferenceErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceErrorKind {
    #[error("reference is empty")]
    Empty,
    #[error("{0}")]
    Syntax(String),
    #[error("invalid tag '{0}'")]
    Tag(String),
    #[error(transparent)]
    Digest(#[from] DigestError),
}

/// Registry host plus repository path, without tag or digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    registry: String,
    path: String,
}

impl Repository {
    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// URL schemes to try, in order, when reaching the registry API
    ///
    /// Local and private-network registries are often served without TLS, so
    /// for those plain http is tried after https.
    pub fn schemes(&self) -> &'static [&'static str] {
        if is_local_host(host_of(&self.registry)) {
            HTTPS_THEN_HTTP
        } else {
            HTTPS_ONLY
        }
    }

    /// Globally unique name as notary knows it
    pub fn gun(&self) -> String {
        if self.registry == DOCKER_HUB_REGISTRY {
            format!("docker.io/{}", self.path)
        } else {
            format!("{}/{}", self.registry, self.path)
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.path)
    }
}

/// Host part of `host[:port]`, brackets stripped from IPv6 literals
fn host_of(registry: &str) -> &str {
    if let Some(rest) = registry.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    registry.rsplit_once(':').map_or(registry, |(host, _)| host)
}

fn is_local_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local") {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private(),
        Ok(IpAddr::V6(ip)) => ip == Ipv6Addr::LOCALHOST,
        Err(_) => false,
    }
}

/// What a reference selects inside its repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Tag(String),
    Digest(Digest),
}

/// A fully-qualified pointer to one image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    repository: Repository,
    selector: Selector,
}

impl Reference {
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.selector {
            Selector::Tag(tag) => Some(tag),
            Selector::Digest(_) => None,
        }
    }

    /// The tag or digest string, as used in manifest URLs
    pub fn identifier(&self) -> String {
        match &self.selector {
            Selector::Tag(tag) => tag.clone(),
            Selector::Digest(digest) => digest.to_string(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Tag(tag) => write!(f, "{}:{}", self.repository, tag),
            Selector::Digest(digest) => write!(f, "{}@{}", self.repository, digest),
        }
    }
}

impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let error = |kind| ReferenceError {
            input: input.to_string(),
            kind,
        };

        if input.is_empty() {
            return Err(error(ReferenceErrorKind::Empty));
        }

        let parsed = input
            .parse::<oci_client::Reference>()
            .map_err(|e| error(ReferenceErrorKind::Syntax(e.to_string())))?;

        // a digest pins the image; any tag next to it is informational
        let selector = match parsed.digest() {
            Some(digest) => Selector::Digest(
                digest
                    .parse()
                    .map_err(|e| error(ReferenceErrorKind::Digest(e)))?,
            ),
            None => Selector::Tag(parsed.tag().unwrap_or(DEFAULT_TAG).to_string()),
        };

        Ok(Self {
            repository: Repository {
                registry: parsed.resolve_registry().to_string(),
                path: parsed.repository().to_string(),
            },
            selector,
        })
    }
}
