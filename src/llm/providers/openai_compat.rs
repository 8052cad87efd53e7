//! OpenAI-compatible chat completions: OpenAI, DeepSeek and Zhipu

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{chat_messages, error_code, ChatMessage};
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::llm::http::HttpClientBase;
use crate::llm::reasoning::resolve_answer;
use crate::llm::{Backend, FinishReason, GenerationResult, ResolvedRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OpenAi,
    DeepSeek,
    Zhipu,
}

impl Flavor {
    fn filtered_reasons(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi | Self::DeepSeek => &["content_filter"],
            Self::Zhipu => &["sensitive"],
        }
    }

    fn safety_codes(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi | Self::DeepSeek => &["content_policy_violation", "content_filter"],
            Self::Zhipu => &["1301"],
        }
    }

    fn reads_reasoning(self) -> bool {
        matches!(self, Self::DeepSeek | Self::Zhipu)
    }
}

pub struct OpenAiCompatBackend {
    http: HttpClientBase,
    api_key: String,
    model: String,
    flavor: Flavor,
}

impl OpenAiCompatBackend {
    pub fn openai(http: HttpClientBase, api_key: String, settings: &ProviderConfig) -> Self {
        Self::with_flavor(http, api_key, settings, Flavor::OpenAi)
    }

    pub fn deepseek(http: HttpClientBase, api_key: String, settings: &ProviderConfig) -> Self {
        Self::with_flavor(http, api_key, settings, Flavor::DeepSeek)
    }

    pub fn zhipu(http: HttpClientBase, api_key: String, settings: &ProviderConfig) -> Self {
        Self::with_flavor(http, api_key, settings, Flavor::Zhipu)
    }

    fn with_flavor(
        http: HttpClientBase,
        api_key: String,
        settings: &ProviderConfig,
        flavor: Flavor,
    ) -> Self {
        Self {
            http,
            api_key,
            model: settings.default_model.clone(),
            flavor,
        }
    }

    fn classify(&self, err: LlmError) -> LlmError {
        if let LlmError::Status { body, .. } = &err {
            if let Some(code) = error_code(body) {
                if self.flavor.safety_codes().contains(&code.as_str()) {
                    return LlmError::SafetyBlocked(code);
                }
            }
        }
        err
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<Thinking>,
}

#[derive(Serialize)]
struct Thinking {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<Message>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
    reasoning_content: Option<String>,
}

#[async_trait]
impl Backend for OpenAiCompatBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<GenerationResult, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: chat_messages(&request.prompt),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            thinking: (self.flavor == Flavor::Zhipu && request.thinking).then_some(Thinking {
                kind: "enabled",
            }),
        };

        let response: ChatResponse = self
            .http
            .post_bearer(&self.http.url("chat/completions"), &self.api_key, &body)
            .await
            .map_err(|e| self.classify(e))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".into()))?;

        let raw = choice.finish_reason;
        let finish = GenerationResult::classify_finish(
            raw.as_deref(),
            self.flavor.filtered_reasons(),
            &["length"],
        );
        if finish == FinishReason::Filtered {
            let reason = raw.clone().unwrap_or_default();
            return Ok(GenerationResult::filtered(
                format!("Content blocked by safety filter ({reason})"),
                raw,
            ));
        }

        let (content, reasoning) = match choice.message {
            Some(m) => (m.content, m.reasoning_content),
            None => (None, None),
        };
        let reasoning = reasoning.filter(|_| self.flavor.reads_reasoning());
        let text = resolve_answer(content.as_deref(), reasoning.as_deref()).unwrap_or_default();

        Ok(GenerationResult::completed(text, raw).with_finish_reason(finish))
    }
}
