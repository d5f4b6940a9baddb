//! One run of the out step

use crate::config::OutRequest;
use crate::error::Result;
use crate::image::TarballImage;
use crate::orchestrator::PushOrchestrator;
use crate::output::{RunResult, report};
use crate::plan;
use crate::registry::Pusher;
use crate::trust::{Signer, TrustConfig, TrustSigner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct Runner {
    destination: PathBuf,
    pusher: Arc<dyn Pusher>,
    signer: Arc<dyn Signer>,
}

impl Runner {
    pub fn new(destination: impl Into<PathBuf>, pusher: Arc<dyn Pusher>, signer: Arc<dyn Signer>) -> Self {
        Self {
            destination: destination.into(),
            pusher,
            signer,
        }
    }

    /// Resolve, load, push, sign and report
    pub async fn run(&self, request: &OutRequest) -> Result<RunResult> {
        let source = &request.source;
        debug!(source = ?source, params = ?request.params, "decoded request");

        let extra_tags = request.params.tag_source(&self.destination).load()?;
        let plan = plan::resolve(&source.repository, &source.tag(), &extra_tags)?;

        let image_path = request.params.image_path(&self.destination);
        let image = TarballImage::from_path(&image_path)?;
        debug!(path = %image_path.display(), layers = image.layers().len(), "loaded image");

        let trust = TrustSigner::new(
            TrustConfig::from_source(source, &self.destination),
            self.signer.clone(),
        );

        let outcome = PushOrchestrator::new(self.pusher.as_ref(), &trust)
            .run(&image, &plan, &source.credentials())
            .await?;

        if !outcome.signing_failures.is_empty() {
            warn!(
                unsigned = outcome.signing_failures.len(),
                "image pushed, but not every reference was signed"
            );
        }

        Ok(report(&outcome.digest, source, &outcome.applied_tags))
    }
}
