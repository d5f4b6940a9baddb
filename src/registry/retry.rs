//! Retrying transport decorator
//!
//! Wraps another [`Transport`] and replays requests whose outcome is
//! transient: connection failures, timeouts, and 408/429/5xx responses.
//! Registry uploads are content addressed, so replaying a blob or manifest
//! request cannot corrupt the target.

use crate::error::TransportError;
use crate::error::handlers::HttpErrorHandler;
use crate::registry::transport::Transport;
use async_trait::async_trait;
use reqwest::{Request, Response};
use std::time::Duration;
use tracing::warn;

pub const ENV_RETRY_ATTEMPTS: &str = "REGISTRY_IMAGE_OUT_RETRY_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "REGISTRY_IMAGE_OUT_RETRY_BASE_MS";

/// Backoff exponent cap: delays stop doubling after 2^4
const MAX_BACKOFF_EXPONENT: u32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Defaults overridden by `REGISTRY_IMAGE_OUT_RETRY_*` variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policy = Self::default();

        if let Some(attempts) = lookup(ENV_RETRY_ATTEMPTS).and_then(|v| v.parse::<u32>().ok()) {
            policy.max_attempts = attempts.max(1);
        }
        if let Some(base_ms) = lookup(ENV_RETRY_BASE_MS).and_then(|v| v.parse::<u64>().ok()) {
            policy.base_delay = Duration::from_millis(base_ms);
        }

        policy
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

fn is_transient(outcome: &Result<Response, TransportError>) -> bool {
    match outcome {
        Ok(response) => HttpErrorHandler::is_transient_status(response.status()),
        Err(err) => err.is_transient(),
    }
}

fn describe(outcome: &Result<Response, TransportError>) -> String {
    match outcome {
        Ok(response) => format!("HTTP {}", response.status()),
        Err(err) => err.to_string(),
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut attempt = 1;
        loop {
            // streaming bodies cannot be replayed
            let Some(replay) = request.try_clone() else {
                return self.inner.send(request).await;
            };

            let outcome = self.inner.send(replay).await;
            if attempt >= self.policy.max_attempts || !is_transient(&outcome) {
                return outcome;
            }

            let delay = self.policy.delay_after(attempt);
            warn!(
                method = %request.method(),
                url = %request.url(),
                attempt,
                max_attempts = self.policy.max_attempts,
                "transient failure ({}), retrying in {:?}",
                describe(&outcome),
                delay
            );
            drop(outcome);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
