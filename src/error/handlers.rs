//! HTTP status classification for registry responses

use crate::error::RegistryError;
use reqwest::StatusCode;

/// Maps registry HTTP statuses to errors and retry decisions
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Statuses where replaying the same request can succeed
    pub fn is_transient_status(status: StatusCode) -> bool {
        match status.as_u16() {
            408 | 429 => true,
            501 => false,
            code => (500..600).contains(&code),
        }
    }

    /// Build the error for an unexpected registry response
    pub fn registry_error(status: StatusCode, error_text: &str, operation: &str) -> RegistryError {
        let message = match status.as_u16() {
            400 => format!("bad request: {}", error_text),
            401 => format!("unauthorized: {}", error_text),
            403 => format!("forbidden, insufficient permissions: {}", error_text),
            404 => format!("repository or upload session not found: {}", error_text),
            409 => format!("conflict: {}", error_text),
            413 => format!("payload too large: {}", error_text),
            429 => format!("rate limited: {}", error_text),
            500 => format!("registry server error: {}", error_text),
            502 | 503 => format!("registry unavailable: {}", error_text),
            504 => format!("registry gateway timeout: {}", error_text),
            507 => format!("registry out of storage: {}", error_text),
            _ => error_text.to_string(),
        };

        RegistryError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            message,
        }
    }

    /// Read the body of a failed response and turn it into an error
    pub async fn from_response(response: reqwest::Response, operation: &str) -> RegistryError {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error response".to_string());
        Self::registry_error(status, error_text.trim(), operation)
    }
}
