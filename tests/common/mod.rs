//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const CONFIG: &[u8] = br#"{"architecture":"amd64","os":"linux"}"#;

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, path, data).unwrap();
}

/// Write a single-image `docker save` archive with one uncompressed layer
pub fn write_image_tarball(dir: &Path, name: &str) -> PathBuf {
    let manifest = r#"[{"Config":"config.json","RepoTags":["app:dev"],"Layers":["layer1/layer.tar"]}]"#;

    let mut builder = tar::Builder::new(Vec::new());
    append(&mut builder, "manifest.json", manifest.as_bytes());
    append(&mut builder, "config.json", CONFIG);
    append(&mut builder, "layer1/layer.tar", b"layer contents");

    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, builder.into_inner().unwrap()).unwrap();
    path
}
