//! Signing through the `notary` CLI

use crate::error::SigningError;
use crate::image::Image;
use crate::reference::Reference;
use crate::trust::{PreparedTrust, Signer};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const PASSPHRASE_VARS: [&str; 3] = [
    "NOTARY_TARGETS_PASSPHRASE",
    "NOTARY_SNAPSHOT_PASSPHRASE",
    "NOTARY_DELEGATION_PASSPHRASE",
];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs `notary addhash ... --publish` for each signed reference
#[derive(Debug, Clone)]
pub struct NotarySigner {
    program: PathBuf,
    timeout: Duration,
}

impl Default for NotarySigner {
    fn default() -> Self {
        Self::new("notary")
    }
}

impl NotarySigner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound on one `notary` run; the child is killed when it runs over
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the child process; passphrases and registry credentials are set
    /// on it alone
    pub fn command(
        &self,
        reference: &Reference,
        image: &dyn Image,
        trust: &PreparedTrust,
    ) -> Result<Command, SigningError> {
        let tag = reference
            .tag()
            .ok_or_else(|| SigningError::Untagged(reference.to_string()))?;
        let size = image.manifest_bytes()?.len();
        let digest = image.digest()?;

        let mut command = Command::new(&self.program);
        command
            .arg("-c")
            .arg(&trust.config_path)
            .arg("-s")
            .arg(&trust.server)
            .arg("addhash")
            .arg(reference.repository().gun())
            .arg(tag)
            .arg(size.to_string())
            .arg("--sha256")
            .arg(digest.hex())
            .arg("--publish")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for var in PASSPHRASE_VARS {
            command.env(var, &trust.passphrase);
        }
        if !trust.credentials.is_anonymous() {
            let auth = format!("{}:{}", trust.credentials.username, trust.credentials.password);
            command.env("NOTARY_AUTH", STANDARD.encode(auth));
        }

        Ok(command)
    }
}

#[async_trait]
impl Signer for NotarySigner {
    async fn sign(
        &self,
        reference: &Reference,
        image: &dyn Image,
        trust: &PreparedTrust,
    ) -> Result<(), SigningError> {
        let mut command = self.command(reference, image, trust)?;
        let program = self.program.display().to_string();

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| SigningError::Timeout {
                program: program.clone(),
                after: self.timeout,
            })?
            .map_err(|source| SigningError::Spawn { program, source })?;

        if !output.status.success() {
            return Err(SigningError::Notary {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!(reference = %reference, "published trust data");
        Ok(())
    }
}
