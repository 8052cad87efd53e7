//! Unified error handling for the ngdigest crate
//!
//! Library code returns [`Result`], whose error type consolidates the
//! per-call provider failures ([`LlmError`]) with configuration, storage and
//! rendering failures.
//!
//! # Architecture
//!
//! - [`Recoverable`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum
//!
//! # Usage
//!
//! ```rust,ignore
//! use ngdigest::error::{Error, Recoverable};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {err}");
//!     } else {
//!         eprintln!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::utils::error::LlmError;

/// Common trait for all ngdigest error types
pub trait Recoverable: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Provider-side failures (API errors, content policy)
    Llm,
    /// Parsing and data extraction errors
    Parsing,
    /// Storage and I/O errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short human-readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Llm => "llm",
            Self::Parsing => "parsing",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the ngdigest crate
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Provider name outside the supported set
    #[error("Unknown AI provider: {0} (supported: gemini, openai, claude, ollama, tongyi, deepseek, hunyuan, zhipu)")]
    UnknownProvider(String),

    /// Required credential not configured for the selected provider
    #[error("Provider {provider} requires credential {variable}")]
    MissingCredential {
        provider: &'static str,
        variable: &'static str,
    },

    /// None of the candidate models could be initialized
    #[error("No usable model for provider {provider} (tried: {})", tried.join(", "))]
    NoUsableModel {
        provider: &'static str,
        tried: Vec<String>,
    },

    /// Provider call or client construction errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The processing cache could not be written; progress can no longer be kept
    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Template registration errors
    #[error("Template error: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    /// Template rendering errors
    #[error("Render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

impl Recoverable for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_recoverable(),
            Self::Io(_) => true,
            Self::Config(_)
            | Self::UnknownProvider(_)
            | Self::MissingCredential { .. }
            | Self::NoUsableModel { .. }
            | Self::Persistence { .. }
            | Self::Json(_)
            | Self::Template(_)
            | Self::Render(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Llm(e) => e.category(),
            Self::Config(_)
            | Self::UnknownProvider(_)
            | Self::MissingCredential { .. }
            | Self::NoUsableModel { .. } => ErrorCategory::Config,
            Self::Persistence { .. } | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Template(_) | Self::Render(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap an I/O failure on the cache file
    pub fn persistence(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<handlebars::TemplateError> for Error {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(Box::new(err))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
