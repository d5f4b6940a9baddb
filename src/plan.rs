//! Push plan resolution
//!
//! Turns the configured repository, its primary tag, and the list of additional
//! tags into the ordered set of references one run pushes to. Resolution is
//! pure string parsing; reading a tag file happens in [`TagSource::load`]
//! before resolution starts.

use crate::digest::Digest;
use crate::reference::{Reference, ReferenceError, ReferenceErrorKind};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("failed to read additional tags file {path}: {source}")]
pub struct TagParseError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Where the additional tags of a run come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagSource {
    #[default]
    None,
    Literal(Vec<String>),
    /// File whose whitespace-separated tokens are the tags
    File(PathBuf),
}

impl TagSource {
    pub fn load(&self) -> Result<Vec<String>, TagParseError> {
        match self {
            TagSource::None => Ok(Vec::new()),
            TagSource::Literal(tags) => Ok(tags.clone()),
            TagSource::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| TagParseError {
                    path: path.clone(),
                    source,
                })?;
                Ok(split_tags(&content))
            }
        }
    }
}

pub fn split_tags(content: &str) -> Vec<String> {
    content.split_whitespace().map(str::to_string).collect()
}

/// An extra reference plus the literal tag that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraReference {
    pub tag: String,
    pub reference: Reference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPlan {
    pub primary: Reference,
    pub extras: Vec<ExtraReference>,
}

impl PushPlan {
    /// Tags of the extra references, in push order
    pub fn extra_tags(&self) -> Vec<String> {
        self.extras.iter().map(|extra| extra.tag.clone()).collect()
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        std::iter::once(&self.primary).chain(self.extras.iter().map(|extra| &extra.reference))
    }
}

/// Resolve the primary reference and one extra reference per tag.
///
/// `primary` is either a tag or a `sha256:` digest. Every extra reference
/// must land in the primary's repository under exactly the given tag; any
/// malformed input fails the whole plan.
pub fn resolve(
    repository: &str,
    primary: &str,
    extra_tags: &[String],
) -> Result<PushPlan, ReferenceError> {
    let primary_name = if primary.parse::<Digest>().is_ok() {
        format!("{repository}@{primary}")
    } else {
        format!("{repository}:{primary}")
    };
    let primary: Reference = primary_name.parse()?;

    let extras = extra_tags
        .iter()
        .map(|tag| {
            let name = format!("{}:{}", primary.repository(), tag);
            let invalid = || ReferenceError {
                input: name.clone(),
                kind: ReferenceErrorKind::Tag(tag.clone()),
            };

            let reference: Reference = name.parse().map_err(|_| invalid())?;
            if reference.repository() != primary.repository() || reference.tag() != Some(tag.as_str()) {
                return Err(invalid());
            }

            Ok(ExtraReference {
                tag: tag.clone(),
                reference,
            })
        })
        .collect::<Result<Vec<_>, ReferenceError>>()?;

    debug!(primary = %primary, extras = extras.len(), "resolved push plan");

    Ok(PushPlan { primary, extras })
}
