//! Push orchestration
//!
//! One run pushes a single image to its primary reference, then to each extra
//! tag in order. A failed push ends the run; a failed signature does not.

use crate::digest::Digest;
use crate::error::{OutError, SigningError};
use crate::image::Image;
use crate::plan::PushPlan;
use crate::reference::Reference;
use crate::registry::{Credentials, Pusher, TransportPolicy};
use crate::trust::TrustSigner;
use tracing::{error, info};

/// A signing failure that was logged and skipped
#[derive(Debug)]
pub struct SigningFailure {
    pub reference: Reference,
    pub error: SigningError,
}

#[derive(Debug)]
pub struct PushOutcome {
    pub digest: Digest,
    /// Extra tags pushed, in push order
    pub applied_tags: Vec<String>,
    pub signing_failures: Vec<SigningFailure>,
}

pub struct PushOrchestrator<'a> {
    pusher: &'a dyn Pusher,
    trust: &'a TrustSigner,
}

impl<'a> PushOrchestrator<'a> {
    pub fn new(pusher: &'a dyn Pusher, trust: &'a TrustSigner) -> Self {
        Self { pusher, trust }
    }

    pub async fn run(
        &self,
        image: &dyn Image,
        plan: &PushPlan,
        credentials: &Credentials,
    ) -> Result<PushOutcome, OutError> {
        let digest = image.digest()?;
        let mut signing_failures = Vec::new();

        info!("pushing {} to {}", digest, plan.primary);
        self.pusher
            .push(&plan.primary, image, credentials, TransportPolicy::Retrying)
            .await
            .map_err(|source| OutError::Push {
                reference: plan.primary.clone(),
                source,
            })?;
        info!("pushed");
        self.sign(&plan.primary, image, &mut signing_failures).await;

        let mut applied_tags = Vec::with_capacity(plan.extras.len());
        for extra in &plan.extras {
            info!("tagging {} with {}", digest, extra.tag);
            self.pusher
                .push(&extra.reference, image, credentials, TransportPolicy::Plain)
                .await
                .map_err(|source| OutError::Tag {
                    tag: extra.tag.clone(),
                    reference: extra.reference.clone(),
                    source,
                })?;
            info!("tagged");
            applied_tags.push(extra.tag.clone());
            self.sign(&extra.reference, image, &mut signing_failures).await;
        }

        Ok(PushOutcome {
            digest,
            applied_tags,
            signing_failures,
        })
    }

    async fn sign(&self, reference: &Reference, image: &dyn Image, failures: &mut Vec<SigningFailure>) {
        if let Err(err) = self.trust.maybe_sign(reference, image).await {
            error!(reference = %reference, error = %err, "failed to sign image");
            failures.push(SigningFailure {
                reference: reference.clone(),
                error: err,
            });
        }
    }
}
