//! Multi-provider text generation
//!
//! One operation, [`TextGenerator::generate`], over eight heterogeneous
//! backends. Backends speak their own wire formats and return
//! `Result<GenerationResult, LlmError>`; [`ProviderAdapter`] applies the
//! optional retry policy and folds every failure into the result, so nothing
//! escapes a call as an error.

pub mod http;
pub mod providers;
pub mod reasoning;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{Error, LlmError, Recoverable, Result};
use crate::utils::is_blank;
use crate::utils::retry::{with_retry_if, RetryConfig};

use self::http::HttpClientBase;
use self::providers::{
    claude::ClaudeBackend, dashscope::DashScopeBackend, gemini::GeminiBackend,
    hunyuan::HunyuanBackend, ollama::OllamaBackend, openai_compat::OpenAiCompatBackend,
};

/// System prompt sent by every chat-style backend
pub const SYSTEM_PROMPT: &str = "你是一个专业的新闻分析助手，擅长分析、翻译和总结新闻文章。";

/// One generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub thinking: Option<bool>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_thinking(mut self, thinking: bool) -> Self {
        self.thinking = Some(thinking);
        self
    }
}

/// Request with provider defaults filled in, as seen by a backend
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub thinking: bool,
}

/// Canonical terminal state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Completed,
    Truncated,
    Filtered,
    Error,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Truncated => "truncated",
            Self::Filtered => "filtered",
            Self::Error => "error",
        })
    }
}

/// Outcome of a call
///
/// On success `text` holds the trimmed output; on failure `error` holds the
/// message. Both may be empty on a degenerate empty-but-ok response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub text: Option<String>,
    pub finish_reason: FinishReason,
    /// The provider's own finish vocabulary, when it sent one
    pub raw_finish_reason: Option<String>,
    pub error: Option<String>,
    /// Provider-specific payload such as Gemini safety ratings
    pub extras: serde_json::Value,
}

impl GenerationResult {
    pub fn completed(text: impl Into<String>, raw_finish_reason: Option<String>) -> Self {
        Self {
            text: Some(text.into()),
            finish_reason: FinishReason::Completed,
            raw_finish_reason,
            error: None,
            extras: serde_json::Value::Null,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            text: None,
            finish_reason: FinishReason::Error,
            raw_finish_reason: None,
            error: Some(message.into()),
            extras: serde_json::Value::Null,
        }
    }

    /// Content-policy rejection
    pub fn filtered(message: impl Into<String>, raw_finish_reason: Option<String>) -> Self {
        Self {
            text: None,
            finish_reason: FinishReason::Filtered,
            raw_finish_reason,
            error: Some(message.into()),
            extras: serde_json::Value::Null,
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }

    pub fn with_extras(mut self, extras: serde_json::Value) -> Self {
        self.extras = extras;
        self
    }

    /// Whether the call ended in a content-policy rejection
    pub fn is_safety_blocked(&self) -> bool {
        self.finish_reason == FinishReason::Filtered
            || self
                .error
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains("safety filter"))
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Map a provider finish string onto the canonical enum
    pub fn classify_finish(raw: Option<&str>, filtered: &[&str], truncated: &[&str]) -> FinishReason {
        match raw {
            Some(r) if filtered.iter().any(|f| f.eq_ignore_ascii_case(r)) => FinishReason::Filtered,
            Some(r) if truncated.iter().any(|t| t.eq_ignore_ascii_case(r)) => FinishReason::Truncated,
            _ => FinishReason::Completed,
        }
    }
}

/// Anything that can turn a prompt into a [`GenerationResult`]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Source tag recorded on processed articles
    fn source_tag(&self) -> String {
        format!("{}-{}", self.provider(), self.model())
    }

    /// Never fails; errors are reported inside the result
    async fn generate(&self, request: &GenerationRequest) -> GenerationResult;
}

/// Wire-level implementation of one provider
#[async_trait]
pub trait Backend: Send + Sync {
    fn model(&self) -> &str;

    async fn call(&self, request: &ResolvedRequest) -> std::result::Result<GenerationResult, LlmError>;
}

/// The selected provider, constructed once at startup
pub struct ProviderAdapter {
    kind: ProviderKind,
    settings: ProviderConfig,
    backend: Box<dyn Backend>,
    retry: RetryConfig,
}

impl fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.kind)
            .field("model", &self.backend.model())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ProviderAdapter {
    /// Construct the adapter for `kind`
    ///
    /// Fails fast when a required credential is missing or no candidate model
    /// can be initialized.
    pub async fn connect(
        kind: ProviderKind,
        settings: &ProviderConfig,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self> {
        let credentials = [settings.api_key.as_deref(), settings.secret_key.as_deref()];
        for (variable, value) in kind.credential_vars().iter().zip(credentials) {
            if is_blank(value) {
                return Err(Error::MissingCredential {
                    provider: kind.as_str(),
                    variable: *variable,
                });
            }
        }
        let api_key = settings.api_key.clone().unwrap_or_default();

        let http = HttpClientBase::new(kind, &settings.base_url, timeout)?;

        let backend: Box<dyn Backend> = match kind {
            ProviderKind::Gemini => {
                Box::new(GeminiBackend::connect(http, api_key, &settings.candidates()).await?)
            }
            ProviderKind::Openai => Box::new(OpenAiCompatBackend::openai(http, api_key, settings)),
            ProviderKind::Deepseek => {
                Box::new(OpenAiCompatBackend::deepseek(http, api_key, settings))
            }
            ProviderKind::Zhipu => Box::new(OpenAiCompatBackend::zhipu(http, api_key, settings)),
            ProviderKind::Claude => Box::new(ClaudeBackend::new(http, api_key, settings)),
            ProviderKind::Ollama => Box::new(OllamaBackend::new(http, settings)),
            ProviderKind::Tongyi => Box::new(DashScopeBackend::new(http, api_key, settings)),
            ProviderKind::Hunyuan => Box::new(HunyuanBackend::new(
                http,
                api_key,
                settings.secret_key.clone().unwrap_or_default(),
                settings,
            )?),
        };

        info!(
            provider = kind.as_str(),
            model = backend.model(),
            max_retries = retry.max_retries,
            "Provider adapter ready"
        );

        Ok(Self {
            kind,
            settings: settings.clone(),
            backend,
            retry,
        })
    }

    fn resolve(&self, request: &GenerationRequest) -> ResolvedRequest {
        ResolvedRequest {
            prompt: request.prompt.clone(),
            temperature: request.temperature.unwrap_or(self.settings.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.settings.max_tokens),
            thinking: request.thinking.unwrap_or(self.settings.thinking),
        }
    }

    fn describe_failure(&self, err: &LlmError) -> String {
        let hint = match err {
            LlmError::Status { status: 401 | 403, .. } => match self.kind.credential_vars() {
                [] => None,
                vars => Some(format!("check {}", vars.join(" / "))),
            },
            LlmError::Status { status: 402, .. } => Some("insufficient account balance".to_string()),
            _ => None,
        };
        match hint {
            Some(hint) => format!("{err} ({hint})"),
            None => err.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for ProviderAdapter {
    fn provider(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        self.backend.model()
    }

    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        if request.prompt.trim().is_empty() {
            return GenerationResult::failure("empty prompt");
        }

        let resolved = self.resolve(request);
        let outcome = with_retry_if(
            &self.retry,
            || self.backend.call(&resolved),
            |e: &LlmError| e.is_recoverable(),
        )
        .await;

        match outcome {
            Ok(mut result) => {
                result.text = result.text.map(|t| t.trim().to_string());
                debug!(
                    provider = self.kind.as_str(),
                    finish_reason = %result.finish_reason,
                    chars = result.text.as_deref().map_or(0, |t| t.chars().count()),
                    "Generation finished"
                );
                result
            }
            Err(e) if e.is_safety() => {
                warn!(provider = self.kind.as_str(), error = %e, "Content blocked by provider");
                GenerationResult::filtered(e.to_string(), None)
            }
            Err(e) => {
                warn!(
                    provider = self.kind.as_str(),
                    category = e.category().as_str(),
                    error = %e,
                    "Generation failed"
                );
                GenerationResult::failure(self.describe_failure(&e))
            }
        }
    }
}
