//! Error types for provider calls
//!
//! Every failure of a single generation call is classified here before the
//! adapter folds it into a `GenerationResult`.

use thiserror::Error;

use crate::error::{ErrorCategory, Recoverable};

/// Errors that can occur while talking to a text-generation provider
#[derive(Error, Debug)]
pub enum LlmError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("Request timeout")]
    Timeout,

    /// Provider throttled the request (HTTP 429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Non-2xx response
    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Provider-reported error inside a 2xx body
    #[error("Provider error {code}: {message}")]
    Api { code: String, message: String },

    /// Body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Content-policy rejection
    #[error("Content blocked by safety filter ({0})")]
    SafetyBlocked(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs can carry credentials (Gemini `?key=`)
        let err = err.without_url();
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

impl LlmError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited(body)
        } else {
            Self::Status {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Whether this failure is a content-policy rejection
    pub fn is_safety(&self) -> bool {
        matches!(self, Self::SafetyBlocked(_))
    }
}

impl Recoverable for LlmError {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Api { .. } | Self::InvalidResponse(_) | Self::SafetyBlocked(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Timeout | Self::RateLimited(_) | Self::Status { .. } => {
                ErrorCategory::Network
            }
            Self::InvalidResponse(_) => ErrorCategory::Parsing,
            Self::Api { .. } | Self::SafetyBlocked(_) => ErrorCategory::Llm,
        }
    }
}
