//! ngdigest - Nigerian news digest
//!
//! Filters, translates and summarizes scraped Nigerian news articles through
//! one of several LLM providers, resuming interrupted runs from a processing
//! cache.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and provider availability
//! - [`llm`] - Provider adapter over eight text-generation backends
//! - [`processing`] - Resumable batch processor, prompt template, response parsing
//! - [`models`] - Core data structures and types
//! - [`storage`] - Processing cache and article input
//! - [`report`] - JSON, Markdown and HTML reports
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use ngdigest::config::Config;
//! use ngdigest::llm::ProviderAdapter;
//! use ngdigest::utils::retry::RetryConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let provider = config.provider_config(config.provider)?;
//!     let adapter = ProviderAdapter::connect(
//!         config.provider,
//!         provider,
//!         config.batch.request_timeout(),
//!         RetryConfig::new(config.batch.max_retries),
//!     )
//!     .await?;
//!     // BatchProcessor::new(&adapter, ...).run(...).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod processing;
pub mod report;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, ProviderKind};
    pub use crate::error::{Error, ErrorCategory, LlmError, Recoverable, Result};
    pub use crate::llm::{GenerationRequest, GenerationResult, ProviderAdapter, TextGenerator};
    pub use crate::models::{Article, ProcessedArticle};
    pub use crate::processing::{BatchOutcome, BatchProcessor, BatchSettings, PromptTemplate};
    pub use crate::report::{Report, ReportWriter};
    pub use crate::storage::ProcessingCache;
}

// Direct re-exports for convenience
pub use error::{Error, Result};
pub use models::{Article, ProcessedArticle};
