//! HTTP failure classification shared by the provider adapters.

use thiserror::Error;

use crate::domain::errors::ProviderError;

/// Errors that can occur when calling a completion endpoint
#[derive(Error, Debug)]
pub enum HttpApiError {
    /// Invalid request parameters or malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed due to invalid or missing API key
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Unknown model or endpoint
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded, retry after waiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// API server encountered an internal error
    #[error("API server error: {0}")]
    ServerError(String),

    /// API server is overloaded, retry later
    #[error("API server overloaded")]
    Overloaded,

    /// Request timed out waiting for response
    #[error("Timeout waiting for response")]
    Timeout,

    /// Connection could not be established or was dropped
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("Unparseable response: {0}")]
    InvalidResponse(String),

    /// Unknown error occurred
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl HttpApiError {
    /// Returns true if this error is transient and should be retried
    ///
    /// Transient errors include rate limiting, server errors (5xx), overload,
    /// timeouts and dropped connections.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded
                | Self::ServerError(_)
                | Self::Overloaded
                | Self::Timeout
                | Self::Network(_)
        )
    }

    /// Create error from HTTP status code and response body
    ///
    /// - 400: Invalid request
    /// - 401, 403: Authentication failed
    /// - 404: Not found
    /// - 429: Rate limit exceeded
    /// - 529: Server overloaded
    /// - other 5xx: Server error
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            400 => Self::InvalidRequest(body),
            401 | 403 => Self::AuthenticationFailed(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimitExceeded,
            529 => Self::Overloaded,
            500..=599 => Self::ServerError(format!("HTTP {status}: {body}")),
            _ => Self::Unknown(format!("HTTP {status}: {body}")),
        }
    }
}

impl From<reqwest::Error> for HttpApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

impl From<HttpApiError> for ProviderError {
    fn from(err: HttpApiError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }
}
