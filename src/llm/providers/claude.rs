//! Anthropic Messages API

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::llm::http::HttpClientBase;
use crate::llm::{Backend, FinishReason, GenerationResult, ResolvedRequest, SYSTEM_PROMPT};

const API_VERSION: &str = "2023-06-01";

pub struct ClaudeBackend {
    http: HttpClientBase,
    api_key: String,
    model: String,
}

impl ClaudeBackend {
    pub fn new(http: HttpClientBase, api_key: String, settings: &ProviderConfig) -> Self {
        Self {
            http,
            api_key,
            model: settings.default_model.clone(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| LlmError::InvalidResponse("API key is not a valid header value".into()))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Backend for ClaudeBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<GenerationResult, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: SYSTEM_PROMPT,
            messages: [UserMessage {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response: MessagesResponse = self
            .http
            .post_with_headers(&self.http.url("v1/messages"), self.headers()?, &body)
            .await?;

        let raw = response.stop_reason;
        let finish =
            GenerationResult::classify_finish(raw.as_deref(), &["refusal"], &["max_tokens"]);
        if finish == FinishReason::Filtered {
            return Ok(GenerationResult::filtered(
                "Content blocked by safety filter (refusal)",
                raw,
            ));
        }

        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text)
            .collect();

        Ok(GenerationResult::completed(text, raw).with_finish_reason(finish))
    }
}
