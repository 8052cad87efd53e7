//! Google Gemini REST API
//!
//! Candidate models are probed in order at construction and the adapter
//! commits to the first one the API reports as available.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::config::ProviderKind;
use crate::error::{Error, LlmError};
use crate::llm::http::HttpClientBase;
use crate::llm::{Backend, FinishReason, GenerationResult, ResolvedRequest, SYSTEM_PROMPT};

const API_PATH: &str = "v1beta/models";

/// Finish reasons that mean the candidate was withheld by content policy
const BLOCKED_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

pub struct GeminiBackend {
    http: HttpClientBase,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    /// Probe `candidates` in order and keep the first reachable model
    pub async fn connect(
        http: HttpClientBase,
        api_key: String,
        candidates: &[String],
    ) -> Result<Self, Error> {
        for model in candidates {
            let probe = http
                .http
                .get(http.url(&format!("{API_PATH}/{model}")))
                .query(&[("key", api_key.as_str())]);

            match http.send_json::<serde_json::Value>(probe).await {
                Ok(_) => {
                    info!(model = model.as_str(), "Using Gemini model");
                    return Ok(Self {
                        http,
                        api_key,
                        model: model.clone(),
                    });
                }
                Err(e) => {
                    warn!(model = model.as_str(), error = %e, "Gemini model unavailable, trying next");
                }
            }
        }

        Err(Error::NoUsableModel {
            provider: ProviderKind::Gemini.as_str(),
            tried: candidates.to_vec(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    system_instruction: SystemInstruction<'a>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: serde_json::Value,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
    #[serde(default)]
    safety_ratings: serde_json::Value,
}

#[async_trait]
impl Backend for GeminiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<GenerationResult, LlmError> {
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part {
                    text: &request.prompt,
                }],
            }],
            system_instruction: SystemInstruction {
                parts: [Part {
                    text: SYSTEM_PROMPT,
                }],
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let url = self
            .http
            .url(&format!("{API_PATH}/{}:generateContent", self.model));
        let response: GenerateResponse = self
            .http
            .send_json(
                self.http
                    .http
                    .post(url)
                    .query(&[("key", self.api_key.as_str())])
                    .json(&body),
            )
            .await?;

        if let Some(feedback) = response.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                return Ok(GenerationResult::filtered(
                    format!("Content blocked by safety filter (prompt: {reason})"),
                    Some(reason),
                )
                .with_extras(json!({ "safety_ratings": feedback.safety_ratings })));
            }
        }

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no candidates".into()))?;

        let raw = candidate.finish_reason;
        let finish = GenerationResult::classify_finish(raw.as_deref(), BLOCKED_REASONS, &["MAX_TOKENS"]);
        let extras = json!({ "safety_ratings": candidate.safety_ratings });

        if finish == FinishReason::Filtered {
            let reason = raw.clone().unwrap_or_default();
            return Ok(GenerationResult::filtered(
                format!("Content blocked by safety filter ({reason})"),
                raw,
            )
            .with_extras(extras));
        }

        let parts: Vec<String> = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if parts.is_empty() {
            return Err(LlmError::InvalidResponse(format!(
                "unable to extract response text (finish reason {})",
                raw.as_deref().unwrap_or("none")
            )));
        }

        Ok(GenerationResult::completed(parts.concat(), raw)
            .with_finish_reason(finish)
            .with_extras(extras))
    }
}
