//! Registry HTTP API v2 push client
//!
//! Pushing an image to a reference is: authorize, upload every blob the
//! registry does not already have (HEAD, then POST + monolithic PUT), then
//! PUT the manifest under the reference's tag or digest.

use crate::digest::Digest;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, TransportError};
use crate::image::{Blob, Image};
use crate::reference::{Reference, Repository};
use crate::registry::auth::{Authorization, Endpoint, authorize};
use crate::registry::retry::{RetryPolicy, RetryTransport};
use crate::registry::transport::{HttpTransport, Transport, TransportPolicy, build_http_client};
use crate::registry::{Credentials, Pusher};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};
use url::Url;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

pub struct RegistryClient {
    http: Client,
    plain: HttpTransport,
    retrying: RetryTransport<HttpTransport>,
}

impl RegistryClient {
    pub fn new(retry_policy: RetryPolicy) -> Result<Self, TransportError> {
        let http = build_http_client()?;
        Ok(Self {
            plain: HttpTransport::new(http.clone()),
            retrying: RetryTransport::new(HttpTransport::new(http.clone()), retry_policy),
            http,
        })
    }

    fn transport(&self, policy: TransportPolicy) -> &dyn Transport {
        match policy {
            TransportPolicy::Retrying => &self.retrying,
            TransportPolicy::Plain => &self.plain,
        }
    }
}

#[async_trait]
impl Pusher for RegistryClient {
    async fn push(
        &self,
        reference: &Reference,
        image: &dyn Image,
        credentials: &Credentials,
        policy: TransportPolicy,
    ) -> Result<(), RegistryError> {
        let repository = reference.repository();
        let transport = self.transport(policy);

        let Endpoint { base, auth } =
            authorize(&self.http, &self.plain, transport, repository, credentials).await?;
        debug!(reference = %reference, base = %base, auth = ?auth, ?policy, "authorized push");

        let session = PushSession {
            http: &self.http,
            transport,
            base,
            repository,
            auth,
        };

        for blob in image.blobs() {
            session.upload_blob(blob).await?;
        }

        let expected = image.digest()?;
        session
            .put_manifest(
                &reference.identifier(),
                image.manifest_media_type(),
                image.manifest_bytes()?,
                &expected,
            )
            .await
    }
}

struct PushSession<'a> {
    http: &'a Client,
    transport: &'a dyn Transport,
    base: Url,
    repository: &'a Repository,
    auth: Authorization,
}

impl PushSession<'_> {
    fn url(&self, suffix: &str) -> Result<Url, RegistryError> {
        Ok(self
            .base
            .join(&format!("v2/{}/{}", self.repository.path(), suffix))?)
    }

    async fn blob_exists(&self, digest: &Digest) -> Result<bool, RegistryError> {
        let url = self.url(&format!("blobs/{}", digest))?;
        let request = self.auth.apply(self.http.request(Method::HEAD, url)).build()?;
        let response = self.transport.send(request).await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(HttpErrorHandler::from_response(response, "blob existence check").await),
        }
    }

    async fn upload_blob(&self, blob: &Blob) -> Result<(), RegistryError> {
        if self.blob_exists(&blob.digest).await? {
            debug!(digest = %blob.digest.short(), "blob already exists, skipping");
            return Ok(());
        }

        let start = self.url("blobs/uploads/")?;
        let request = self.auth.apply(self.http.post(start)).build()?;
        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "blob upload session").await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| RegistryError::Protocol("missing Location header in upload response".to_string()))?;

        // Location may be absolute or relative to the registry root
        let mut upload_url = self.base.join(location)?;
        upload_url
            .query_pairs_mut()
            .append_pair("digest", &blob.digest.to_string());

        debug!(digest = %blob.digest.short(), size = blob.size(), "uploading blob");

        let request = self
            .auth
            .apply(self.http.put(upload_url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(blob.data.clone())
            .build()?;
        let response = self.transport.send(request).await?;
        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "blob upload").await);
        }

        Ok(())
    }

    async fn put_manifest(
        &self,
        identifier: &str,
        media_type: &str,
        manifest: &[u8],
        expected: &Digest,
    ) -> Result<(), RegistryError> {
        let url = self.url(&format!("manifests/{}", identifier))?;
        let request = self
            .auth
            .apply(self.http.put(url))
            .header(CONTENT_TYPE, media_type)
            .body(manifest.to_vec())
            .build()?;
        let response = self.transport.send(request).await?;

        if !response.status().is_success() {
            return Err(HttpErrorHandler::from_response(response, "manifest upload").await);
        }

        // The local digest stays authoritative; a mismatch is only worth a warning.
        let reported = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|h| h.to_str().ok());
        if let Some(reported) = reported {
            if reported != expected.to_string() {
                warn!(expected = %expected, reported = %reported, "registry reported a different manifest digest");
            }
        }

        Ok(())
    }
}
