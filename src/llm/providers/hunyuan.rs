//! Tencent Hunyuan via Cloud API 3.0 with TC3-HMAC-SHA256 request signing

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ProviderConfig;
use crate::error::{Error, LlmError};
use crate::llm::http::HttpClientBase;
use crate::llm::{Backend, FinishReason, GenerationResult, ResolvedRequest, SYSTEM_PROMPT};

const SERVICE: &str = "hunyuan";
const ACTION: &str = "ChatCompletions";
const VERSION: &str = "2023-09-01";
const ALGORITHM: &str = "TC3-HMAC-SHA256";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const SIGNED_HEADERS: &str = "content-type;host;x-tc-action";

pub struct HunyuanBackend {
    http: HttpClientBase,
    secret_id: String,
    secret_key: String,
    region: String,
    host: String,
    model: String,
}

impl HunyuanBackend {
    pub fn new(
        http: HttpClientBase,
        secret_id: String,
        secret_key: String,
        settings: &ProviderConfig,
    ) -> Result<Self, Error> {
        let url = url::Url::parse(&settings.base_url)
            .map_err(|e| Error::config(format!("hunyuan: invalid base_url: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => return Err(Error::config("hunyuan: base_url has no host")),
        };

        Ok(Self {
            http,
            secret_id,
            secret_key,
            region: settings
                .region
                .clone()
                .unwrap_or_else(|| "ap-beijing".to_string()),
            host,
            model: settings.default_model.clone(),
        })
    }

    /// Authorization header value for `payload` sent at `timestamp`
    fn authorization(&self, payload: &str, timestamp: DateTime<Utc>) -> String {
        let date = timestamp.format("%Y-%m-%d").to_string();
        let canonical_request = format!(
            "POST\n/\n\ncontent-type:{JSON_CONTENT_TYPE}\nhost:{}\nx-tc-action:{}\n\n{SIGNED_HEADERS}\n{}",
            self.host,
            ACTION.to_lowercase(),
            sha256_hex(payload.as_bytes()),
        );
        let credential_scope = format!("{date}/{SERVICE}/tc3_request");
        let string_to_sign = format!(
            "{ALGORITHM}\n{}\n{credential_scope}\n{}",
            timestamp.timestamp(),
            sha256_hex(canonical_request.as_bytes()),
        );

        let secret_date = hmac_sha256(format!("TC3{}", self.secret_key).as_bytes(), date.as_bytes());
        let secret_service = hmac_sha256(&secret_date, SERVICE.as_bytes());
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
        let signature = hex(&hmac_sha256(&secret_signing, string_to_sign.as_bytes()));

        format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.secret_id
        )
    }

    fn headers(&self, payload: &str, timestamp: DateTime<Utc>) -> Result<HeaderMap, LlmError> {
        let value = |v: String| {
            HeaderValue::from_str(&v)
                .map_err(|_| LlmError::InvalidResponse(format!("invalid header value: {v}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value(self.authorization(payload, timestamp))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert("X-TC-Action", HeaderValue::from_static(ACTION));
        headers.insert("X-TC-Version", HeaderValue::from_static(VERSION));
        headers.insert("X-TC-Timestamp", value(timestamp.timestamp().to_string())?);
        headers.insert("X-TC-Region", value(self.region.clone())?);
        Ok(headers)
    }
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match Hmac::<Sha256>::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: [TcMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TcMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    response: TcResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TcResponse {
    #[serde(default)]
    choices: Vec<TcChoice>,
    error: Option<TcError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TcChoice {
    message: Option<TcReply>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TcReply {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TcError {
    code: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl Backend for HunyuanBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn call(&self, request: &ResolvedRequest) -> Result<GenerationResult, LlmError> {
        let body = ChatCompletionsRequest {
            model: &self.model,
            messages: [
                TcMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                TcMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
        };
        let payload = serde_json::to_string(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("cannot encode request: {e}")))?;

        // The signature covers these exact bytes
        let envelope: Envelope = self
            .http
            .send_json(
                self.http
                    .http
                    .post(self.http.url("/"))
                    .headers(self.headers(&payload, Utc::now())?)
                    .body(payload),
            )
            .await?;

        let response = envelope.response;
        if let Some(err) = response.error {
            let lowered = err.code.to_lowercase();
            if lowered.contains("sensitive") || lowered.contains("riskcontrol") {
                return Err(LlmError::SafetyBlocked(err.code));
            }
            return Err(LlmError::Api {
                code: err.code,
                message: err.message,
            });
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".into()))?;

        let raw = choice.finish_reason;
        let finish = GenerationResult::classify_finish(raw.as_deref(), &["sensitive"], &["length"]);
        if finish == FinishReason::Filtered {
            return Ok(GenerationResult::filtered(
                "Content blocked by safety filter (sensitive)",
                raw,
            ));
        }

        let text = choice.message.map(|m| m.content).unwrap_or_default();
        Ok(GenerationResult::completed(text, raw).with_finish_reason(finish))
    }
}
