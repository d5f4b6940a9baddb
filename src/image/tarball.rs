//! `docker save` tarball loader
//!
//! Reads the whole archive once, builds a schema 2 manifest from the config and
//! layers listed in the archive's `manifest.json`, and keeps every blob in
//! memory so that each push of the run uploads exactly the same bytes.
//! Uncompressed layers are gzipped at load time; already-gzipped layers are
//! used as-is.

use crate::digest::Digest;
use crate::error::ImageError;
use crate::image::manifest::{DOCKER_CONFIG, DOCKER_LAYER_GZIP, DOCKER_MANIFEST_V2, Manifest};
use crate::image::{Blob, Image};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, EntryType};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ARCHIVE_MANIFEST: &str = "manifest.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArchiveEntry {
    config: String,
    layers: Vec<String>,
}

#[derive(Debug)]
pub struct TarballImage {
    manifest_bytes: Vec<u8>,
    digest: Digest,
    config: Blob,
    layers: Vec<Blob>,
}

impl TarballImage {
    pub fn from_path(path: &Path) -> Result<Self, ImageError> {
        let file = File::open(path).map_err(|e| ImageError::io(path, e))?;
        let files = read_archive(file).map_err(|e| match e {
            ImageError::Io { source, .. } => ImageError::io(path, source),
            other => other,
        })?;

        let raw_manifest = files
            .get(ARCHIVE_MANIFEST)
            .ok_or_else(|| ImageError::Format(format!("{} not found in archive", ARCHIVE_MANIFEST)))?;
        let mut entries: Vec<ArchiveEntry> = serde_json::from_slice(raw_manifest)?;

        let entry = match entries.len() {
            1 => entries.remove(0),
            0 => return Err(ImageError::Format("archive contains no images".to_string())),
            n => {
                return Err(ImageError::Format(format!(
                    "archive contains {} images, expected exactly one",
                    n
                )));
            }
        };

        let config_data = lookup(&files, &entry.config)?;
        let config = Blob::new(DOCKER_CONFIG, config_data.to_vec());

        let mut layers = Vec::with_capacity(entry.layers.len());
        for layer_path in &entry.layers {
            let data = lookup(&files, layer_path)?;
            let compressed = if data.starts_with(&GZIP_MAGIC) {
                data.to_vec()
            } else {
                gzip(data).map_err(|e| ImageError::io(layer_path, e))?
            };
            let layer = Blob::new(DOCKER_LAYER_GZIP, compressed);
            debug!(layer = %layer_path, digest = %layer.digest.short(), size = layer.size(), "loaded layer");
            layers.push(layer);
        }

        let manifest = Manifest::new(
            config.descriptor(),
            layers.iter().map(Blob::descriptor).collect(),
        );
        manifest.validate().map_err(ImageError::Format)?;
        let manifest_bytes = manifest.to_bytes()?;
        let digest = Digest::sha256(&manifest_bytes);

        Ok(Self {
            manifest_bytes,
            digest,
            config,
            layers,
        })
    }

    pub fn layers(&self) -> &[Blob] {
        &self.layers
    }

    pub fn config(&self) -> &Blob {
        &self.config
    }
}

impl Image for TarballImage {
    fn digest(&self) -> Result<Digest, ImageError> {
        Ok(self.digest.clone())
    }

    fn manifest_bytes(&self) -> Result<&[u8], ImageError> {
        Ok(&self.manifest_bytes)
    }

    fn manifest_media_type(&self) -> &str {
        DOCKER_MANIFEST_V2
    }

    fn blobs(&self) -> Vec<&Blob> {
        self.layers.iter().chain(std::iter::once(&self.config)).collect()
    }
}

/// Regular files keyed by normalised path; symlinks resolved to their targets
fn read_archive<R: Read>(reader: R) -> Result<HashMap<String, Vec<u8>>, ImageError> {
    let io_err = |e| ImageError::io(ARCHIVE_MANIFEST, e);

    let mut archive = Archive::new(reader);
    let mut files = HashMap::new();
    let mut links = Vec::new();

    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let path = normalize(&entry.path().map_err(io_err)?.to_string_lossy());

        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Continuous => {
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data).map_err(io_err)?;
                files.insert(path, data);
            }
            EntryType::Symlink | EntryType::Link => {
                if let Some(target) = entry.link_name().map_err(io_err)? {
                    let target = target.to_string_lossy().into_owned();
                    let resolved = match (entry.header().entry_type(), path.rsplit_once('/')) {
                        (EntryType::Symlink, Some((dir, _))) => normalize(&format!("{dir}/{target}")),
                        _ => normalize(&target),
                    };
                    links.push((path, resolved));
                }
            }
            _ => {}
        }
    }

    for (path, target) in links {
        if let Some(data) = files.get(&target).cloned() {
            files.insert(path, data);
        }
    }

    Ok(files)
}

fn lookup<'a>(files: &'a HashMap<String, Vec<u8>>, path: &str) -> Result<&'a [u8], ImageError> {
    files
        .get(&normalize(path))
        .map(Vec::as_slice)
        .ok_or_else(|| ImageError::Format(format!("{} referenced by {} is missing", path, ARCHIVE_MANIFEST)))
}

fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
