//! Response written to stdout

use crate::config::Source;
use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub digest: Digest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// `{"version": {"digest": ...}, "metadata": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub version: Version,
    pub metadata: Vec<MetadataField>,
}

impl RunResult {
    /// Value of the named metadata field
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }

    /// Write the response as one JSON line
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        serde_json::to_writer(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

/// Build the response for a successful run
///
/// `tags` lists the applied extra tags followed by the primary tag.
pub fn report(digest: &Digest, source: &Source, applied_tags: &[String]) -> RunResult {
    let mut tags = applied_tags.to_vec();
    tags.push(source.tag());

    RunResult {
        version: Version {
            digest: digest.clone(),
        },
        metadata: vec![
            MetadataField::new("repository", source.repository.clone()),
            MetadataField::new("tags", tags.join(" ")),
        ],
    }
}
