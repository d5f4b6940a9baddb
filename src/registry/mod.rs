//! Registry module for Docker registry interactions
//!
//! This module provides the push capability used by the orchestrator, the
//! transports it runs over, and authentication against Docker Registry HTTP
//! API v2 registries.

pub mod auth;
pub mod client;
pub mod retry;
pub mod transport;

use crate::error::RegistryError;
use crate::image::Image;
use crate::reference::Reference;
use async_trait::async_trait;

pub use client::RegistryClient;
pub use retry::{RetryPolicy, RetryTransport};
pub use transport::{HttpTransport, Transport, TransportPolicy};

/// Registry credentials for one run; an empty username means anonymous
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Uploads an image under a reference
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(
        &self,
        reference: &Reference,
        image: &dyn Image,
        credentials: &Credentials,
        policy: TransportPolicy,
    ) -> Result<(), RegistryError>;
}
