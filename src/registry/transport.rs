//! Transport seam for registry requests
//!
//! Every request the registry client makes goes through a [`Transport`], so
//! retry behaviour can be layered on by wrapping one transport in another.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Request, Response};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one HTTP request and returns the raw response
///
/// Non-success statuses are responses, not errors; only failures that produced
/// no response at all are reported as [`TransportError`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Which transport a push goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportPolicy {
    /// Transient failures are replayed per the retry policy
    Retrying,
    /// A single attempt per request
    Plain,
}

/// Plain transport backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        self.client.execute(request).await.map_err(TransportError::from)
    }
}

/// HTTP client shared by request building and the transports
pub fn build_http_client() -> Result<Client, TransportError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(TransportError::from)
}
