//! Alibaba DashScope native text-generation API (Tongyi Qianwen)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{chat_messages, error_code, ChatMessage};
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::llm::http::HttpClientBase;
use crate::llm::{Backend, GenerationResult, ResolvedRequest};

const GENERATION_PATH: &str = "api/v1/services/aigc/text-generation/generation";
const INSPECTION_FAILED: &str = "DataInspectionFailed";

pub struct DashScopeBackend {
    http: HttpClientBase,
    api_key: String,
    model: String,
}

impl DashScopeBackend {
    pub fn new(http: HttpClientBase, api_key: String, settings: &ProviderConfig) -> Self {
        Self {
            http,
            api_key,
            model: settings.default_model.clone(),
        }
    }
}

#[derive(Serialize)]
struct GenerationBody<'a> {
    model: &'a str,
    input: Input<'a>,
    parameters: Parameters,
}

#[derive(Serialize)]
struct Input<'a> {
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct Parameters {
    result_format: &'static str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct GenerationResponse {
    output: Option<Output>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct Output {
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
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Backend for DashScopeBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<GenerationResult, LlmError> {
        let body = GenerationBody {
            model: &self.model,
            input: Input {
                messages: chat_messages(&request.prompt),
            },
            parameters: Parameters {
                result_format: "message",
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            },
        };

        let response: GenerationResponse = self
            .http
            .post_bearer(&self.http.url(GENERATION_PATH), &self.api_key, &body)
            .await
            .map_err(|e| {
                if let LlmError::Status { body, .. } = &e {
                    if error_code(body).as_deref() == Some(INSPECTION_FAILED) {
                        return LlmError::SafetyBlocked(INSPECTION_FAILED.to_string());
                    }
                }
                e
            })?;

        if let Some(code) = response.code.filter(|c| !c.is_empty()) {
            if code == INSPECTION_FAILED {
                return Err(LlmError::SafetyBlocked(code));
            }
            return Err(LlmError::Api {
                code,
                message: response.message.unwrap_or_default(),
            });
        }

        let choice = response
            .output
            .and_then(|o| o.choices.into_iter().next())
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".into()))?;

        let raw = choice.finish_reason;
        let finish = GenerationResult::classify_finish(raw.as_deref(), &[], &["length"]);
        let text = choice.message.map(|m| m.content).unwrap_or_default();
        Ok(GenerationResult::completed(text, raw).with_finish_reason(finish))
    }
}
