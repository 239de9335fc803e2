//! Client error types

use serde::Deserialize;
use thiserror::Error;

/// Message shown when a request never produced a response
pub const NETWORK_FAILURE_MESSAGE: &str = "Network or client error occurred";

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request failed before a response was received
    #[error("Network error: {0}")]
    Network(String),

    /// Server returned a non-success status
    #[error("Server error {status}: {message}")]
    Http { status: u16, message: String },

    /// Response did not have the expected shape
    #[error("Unexpected response format: {0}")]
    Format(String),

    /// A CSRF token could not be obtained for a state-changing request
    #[error("Security error: {0}")]
    Security(String),

    /// Access token refresh failed and the local session was cleared
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

/// FastAPI-style error body
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Build an error from a response body, preferring the server's `detail` field
    pub fn from_body(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.detail)
            .map(|detail| match detail {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            });

        let message = match detail {
            Some(detail) => detail,
            None if !body.trim().is_empty() => body.trim().to_string(),
            None => status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        };

        Self::from_status(status, message)
    }

    /// Consume a non-success response and turn it into an error
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        match response.text().await {
            Ok(body) => Self::from_body(status, &body),
            Err(_) => Self::from_status(status, status.to_string()),
        }
    }

    /// HTTP status carried by the error, if any
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the server rejected the access token
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }

    /// Check if this is a 403 caused by a missing or stale CSRF token
    pub fn is_csrf_rejection(&self) -> bool {
        match self {
            Self::Http {
                status: 403,
                message,
            } => message.to_lowercase().contains("csrf"),
            _ => false,
        }
    }

    /// Check if the session is gone and the user has to log in again
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }

    /// Human-readable message for a failed login or registration
    pub fn login_message(&self) -> String {
        match self {
            Self::Http { message, .. } if !message.trim().is_empty() => message.clone(),
            Self::Http { .. } => "Login failed".to_string(),
            Self::Network(_) => NETWORK_FAILURE_MESSAGE.to_string(),
            Self::Security(message) | Self::SessionExpired(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Format(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}
