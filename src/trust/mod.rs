//! Content trust signing
//!
//! When `source.content_trust.enable` is set, every pushed reference is signed
//! right after its push. Signing never fails the run: [`TrustSigner::maybe_sign`]
//! returns a [`SigningError`] for the caller to log and collect.
//!
//! The notary configuration directory is prepared lazily on the first signing
//! call and reused for the rest of the run. Its location and the passphrases
//! are handed to the [`Signer`] by value; nothing here touches the process
//! environment.

pub mod notary;

use crate::config::{ContentTrust, Source};
use crate::error::SigningError;
use crate::image::Image;
use crate::reference::Reference;
use crate::registry::Credentials;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tracing::debug;

pub use notary::NotarySigner;

const CONFIG_DIR_PREFIX: &str = "notary-config";

/// Signing settings for one run
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub enabled: bool,
    pub settings: ContentTrust,
    /// Directory the scratch configuration directory is created in
    pub scratch_root: PathBuf,
    pub credentials: Credentials,
}

impl TrustConfig {
    pub fn from_source(source: &Source, scratch_root: &Path) -> Self {
        Self {
            enabled: source.content_trust_enabled(),
            settings: source.content_trust.clone().unwrap_or_default(),
            scratch_root: scratch_root.to_path_buf(),
            credentials: source.credentials(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            settings: ContentTrust::default(),
            scratch_root: std::env::temp_dir(),
            credentials: Credentials::default(),
        }
    }
}

/// A written notary configuration directory
///
/// The directory is removed when this value is dropped.
pub struct PreparedTrust {
    dir: TempDir,
    pub config_path: PathBuf,
    pub trust_dir: PathBuf,
    pub server: String,
    pub passphrase: String,
    pub credentials: Credentials,
}

impl PreparedTrust {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Write `config.json`, the repository key and any TLS material
pub fn prepare(config: &TrustConfig) -> Result<PreparedTrust, SigningError> {
    let settings = &config.settings;
    if settings.server.is_empty() {
        return Err(SigningError::MissingSetting("content_trust.server"));
    }
    if !settings.repository_key.is_empty() && settings.repository_key_id.is_empty() {
        return Err(SigningError::MissingSetting("content_trust.repository_key_id"));
    }

    let dir = tempfile::Builder::new()
        .prefix(CONFIG_DIR_PREFIX)
        .tempdir_in(&config.scratch_root)
        .map_err(SigningError::Prepare)?;

    let trust_dir = dir.path().join("trust");
    let private_dir = trust_dir.join("private");
    std::fs::create_dir_all(&private_dir).map_err(SigningError::Prepare)?;

    if !settings.repository_key.is_empty() {
        let key_path = private_dir.join(format!("{}.key", settings.repository_key_id));
        write_secret(&key_path, &settings.repository_key)?;
    }

    let mut remote_server = json!({ "url": settings.server });
    if !settings.tls_cert.is_empty() {
        let cert_path = dir.path().join("tls.cert");
        write_secret(&cert_path, &settings.tls_cert)?;
        remote_server["tls_client_cert"] = json!(cert_path);
    }
    if !settings.tls_key.is_empty() {
        let key_path = dir.path().join("tls.key");
        write_secret(&key_path, &settings.tls_key)?;
        remote_server["tls_client_key"] = json!(key_path);
    }

    let document = json!({
        "trust_dir": trust_dir,
        "remote_server": remote_server,
    });
    let config_path = dir.path().join("config.json");
    let rendered = serde_json::to_vec_pretty(&document)
        .map_err(|e| SigningError::Prepare(std::io::Error::other(e)))?;
    std::fs::write(&config_path, rendered).map_err(SigningError::Prepare)?;

    debug!(dir = %dir.path().display(), "prepared notary config dir");

    Ok(PreparedTrust {
        dir,
        config_path,
        trust_dir,
        server: settings.server.clone(),
        passphrase: settings.repository_passphrase.clone(),
        credentials: config.credentials.clone(),
    })
}

fn write_secret(path: &Path, contents: &str) -> Result<(), SigningError> {
    std::fs::write(path, contents).map_err(SigningError::Prepare)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(SigningError::Prepare)?;
    }

    Ok(())
}

/// Publishes trust data for one pushed reference
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        reference: &Reference,
        image: &dyn Image,
        trust: &PreparedTrust,
    ) -> Result<(), SigningError>;
}

pub struct TrustSigner {
    config: TrustConfig,
    signer: Arc<dyn Signer>,
    prepared: OnceCell<PreparedTrust>,
}

impl TrustSigner {
    pub fn new(config: TrustConfig, signer: Arc<dyn Signer>) -> Self {
        Self {
            config,
            signer,
            prepared: OnceCell::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Sign `reference` if content trust is enabled, otherwise do nothing
    pub async fn maybe_sign(&self, reference: &Reference, image: &dyn Image) -> Result<(), SigningError> {
        if !self.config.enabled {
            return Ok(());
        }

        let prepared = self
            .prepared
            .get_or_try_init(|| async { prepare(&self.config) })
            .await?;

        debug!(reference = %reference, "signing");
        self.signer.sign(reference, image, prepared).await
    }
}
