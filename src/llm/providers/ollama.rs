//! Ollama local generate endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::llm::http::HttpClientBase;
use crate::llm::{Backend, GenerationResult, ResolvedRequest, SYSTEM_PROMPT};

pub struct OllamaBackend {
    http: HttpClientBase,
    model: String,
}

impl OllamaBackend {
    pub fn new(http: HttpClientBase, settings: &ProviderConfig) -> Self {
        Self {
            http,
            model: settings.default_model.clone(),
        }
    }
}

/// Ollama generate request
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
    done_reason: Option<String>,
}

#[async_trait]
impl Backend for OllamaBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<GenerationResult, LlmError> {
        let body = OllamaRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: SYSTEM_PROMPT,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response: OllamaResponse = self
            .http
            .post_json(&self.http.url("api/generate"), &body)
            .await?;

        let raw = response.done_reason.or_else(|| Some("stop".to_string()));
        let finish = GenerationResult::classify_finish(raw.as_deref(), &[], &["length"]);
        Ok(GenerationResult::completed(response.response, raw).with_finish_reason(finish))
    }
}
