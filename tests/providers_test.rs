//! Provider adapter tests against mock HTTP endpoints

mod common;

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ngdigest::config::{ProviderConfig, ProviderKind};
use ngdigest::error::Error;
use ngdigest::llm::{FinishReason, GenerationRequest, ProviderAdapter, TextGenerator};
use ngdigest::utils::retry::RetryConfig;

use common::provider_config;

async fn connect(kind: ProviderKind, settings: &ProviderConfig) -> ProviderAdapter {
    ProviderAdapter::connect(kind, settings, Duration::from_secs(5), RetryConfig::new(0))
        .await
        .unwrap()
}

fn chat_reply(content: &str, finish_reason: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": finish_reason
        }]
    })
}

// ============================================================================
// OpenAI-compatible providers
// ============================================================================

#[tokio::test]
async fn test_openai_completion_is_trimmed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4-turbo-preview", "max_tokens": 4096})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("  done \n", "stop")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Openai, &provider_config(ProviderKind::Openai, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("Summarize")).await;

    assert_eq!(result.text.as_deref(), Some("done"));
    assert_eq!(result.finish_reason, FinishReason::Completed);
    assert_eq!(result.raw_finish_reason.as_deref(), Some("stop"));
    assert!(result.error.is_none());
    assert_eq!(adapter.source_tag(), "openai-gpt-4-turbo-preview");
}

#[tokio::test]
async fn test_request_overrides_reach_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"temperature": 0.5, "max_tokens": 128})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("ok", "length")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Deepseek, &provider_config(ProviderKind::Deepseek, &server.uri())).await;
    let request = GenerationRequest::new("hi").with_temperature(0.5).with_max_tokens(128);
    let result = adapter.generate(&request).await;

    assert_eq!(result.text.as_deref(), Some("ok"));
    assert_eq!(result.finish_reason, FinishReason::Truncated);
}

#[tokio::test]
async fn test_openai_content_filter_is_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("", "content_filter")))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Openai, &provider_config(ProviderKind::Openai, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("hi")).await;

    assert_eq!(result.finish_reason, FinishReason::Filtered);
    assert!(result.is_safety_blocked());
    assert!(result.text.is_none());
}

#[tokio::test]
async fn test_deepseek_reasoning_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "reasoning_content": "The article is about the economy.\nFinal answer: 经济"
                },
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Deepseek, &provider_config(ProviderKind::Deepseek, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("classify")).await;

    assert_eq!(result.text.as_deref(), Some("经济"));
}

#[tokio::test]
async fn test_zhipu_thinking_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "glm-4.7",
            "thinking": {"type": "enabled"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "reasoning_content": "先分析。\n```json\n{\"is_valid\": true}\n```"
                },
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = provider_config(ProviderKind::Zhipu, &server.uri());
    settings.thinking = true;
    let adapter = connect(ProviderKind::Zhipu, &settings).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert_eq!(result.text.as_deref(), Some("{\"is_valid\": true}"));
}

#[tokio::test]
async fn test_zhipu_sensitive_finish() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("", "sensitive")))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Zhipu, &provider_config(ProviderKind::Zhipu, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert!(result.is_safety_blocked());
}

// ============================================================================
// Error folding and retry
// ============================================================================

#[tokio::test]
async fn test_server_error_becomes_error_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Openai, &provider_config(ProviderKind::Openai, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("hi")).await;

    assert_eq!(result.finish_reason, FinishReason::Error);
    assert!(result.text.is_none());
    assert!(result.error.as_deref().unwrap().contains("500"));
    assert!(!result.is_safety_blocked());
}

#[tokio::test]
async fn test_unauthorized_hints_at_credential() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key", "code": "invalid_api_key"}
        })))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Openai, &provider_config(ProviderKind::Openai, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("hi")).await;

    assert!(result.error.as_deref().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn test_bounded_retry_recovers_from_5xx() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("third time", "stop")))
        .expect(1)
        .mount(&server)
        .await;

    let settings = provider_config(ProviderKind::Openai, &server.uri());
    let adapter = ProviderAdapter::connect(
        ProviderKind::Openai,
        &settings,
        Duration::from_secs(5),
        RetryConfig::with_delays(2, 1, 5),
    )
    .await
    .unwrap();
    let result = adapter.generate(&GenerationRequest::new("hi")).await;

    assert_eq!(result.text.as_deref(), Some("third time"));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let settings = provider_config(ProviderKind::Openai, &server.uri());
    let adapter = ProviderAdapter::connect(
        ProviderKind::Openai,
        &settings,
        Duration::from_secs(5),
        RetryConfig::with_delays(3, 1, 5),
    )
    .await
    .unwrap();
    let result = adapter.generate(&GenerationRequest::new("hi")).await;

    assert!(result.is_error());
}

#[tokio::test]
async fn test_empty_prompt_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("x", "stop")))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Openai, &provider_config(ProviderKind::Openai, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("   ")).await;

    assert!(result.is_error());
}

#[tokio::test]
async fn test_missing_credential_fails_construction() {
    let mut settings = ProviderConfig::defaults(ProviderKind::Openai);
    settings.api_key = None;

    let err = ProviderAdapter::connect(
        ProviderKind::Openai,
        &settings,
        Duration::from_secs(5),
        RetryConfig::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        Error::MissingCredential { provider: "openai", variable: "OPENAI_API_KEY" }
    ));
}

// ============================================================================
// Claude, Ollama, DashScope
// ============================================================================

#[tokio::test]
async fn test_claude_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"model": "claude-3-sonnet-20240229"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "分析"}, {"type": "text", "text": "完成"}],
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Claude, &provider_config(ProviderKind::Claude, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert_eq!(result.text.as_deref(), Some("分析完成"));
    assert_eq!(result.raw_finish_reason.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn test_claude_refusal_is_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [],
            "stop_reason": "refusal"
        })))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Claude, &provider_config(ProviderKind::Claude, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert!(result.is_safety_blocked());
}

#[tokio::test]
async fn test_ollama_generate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama2",
            "stream": false,
            "options": {"num_predict": 4096}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama2",
            "response": "{\"is_valid\": false}",
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut settings = ProviderConfig::defaults(ProviderKind::Ollama);
    settings.base_url = server.uri();
    let adapter = connect(ProviderKind::Ollama, &settings).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert_eq!(result.text.as_deref(), Some("{\"is_valid\": false}"));
    assert_eq!(result.raw_finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn test_tongyi_generation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/services/aigc/text-generation/generation"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "qwen-max",
            "parameters": {"result_format": "message"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {"choices": [{
                "message": {"role": "assistant", "content": "通义回答"},
                "finish_reason": "stop"
            }]},
            "request_id": "abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Tongyi, &provider_config(ProviderKind::Tongyi, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert_eq!(result.text.as_deref(), Some("通义回答"));
}

#[tokio::test]
async fn test_tongyi_inspection_failure_is_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/services/aigc/text-generation/generation"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "DataInspectionFailed",
            "message": "Input data may contain inappropriate content."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Tongyi, &provider_config(ProviderKind::Tongyi, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert_eq!(result.finish_reason, FinishReason::Filtered);
    assert!(result.is_safety_blocked());
}

// ============================================================================
// Gemini
// ============================================================================

#[tokio::test]
async fn test_gemini_probes_candidates_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models/gemini-3-flash-preview"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models/gemini-1.5-pro"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "models/gemini-1.5-pro"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 8192}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Gemini "}, {"text": "says hi"}], "role": "model"},
                "finishReason": "STOP",
                "safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Gemini, &provider_config(ProviderKind::Gemini, &server.uri())).await;
    assert_eq!(adapter.model(), "gemini-1.5-pro");

    let result = adapter.generate(&GenerationRequest::new("hello")).await;
    assert_eq!(result.text.as_deref(), Some("Gemini says hi"));
    assert_eq!(result.extras["safety_ratings"][0]["probability"], "NEGLIGIBLE");
}

#[tokio::test]
async fn test_gemini_no_usable_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = ProviderAdapter::connect(
        ProviderKind::Gemini,
        &provider_config(ProviderKind::Gemini, &server.uri()),
        Duration::from_secs(5),
        RetryConfig::default(),
    )
    .await
    .unwrap_err();

    match err {
        Error::NoUsableModel { provider, tried } => {
            assert_eq!(provider, "gemini");
            assert_eq!(tried, vec!["gemini-3-flash-preview", "gemini-1.5-pro"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_gemini_blocked_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": {"blockReason": "SAFETY", "safetyRatings": []}
        })))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Gemini, &provider_config(ProviderKind::Gemini, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("hello")).await;

    assert_eq!(result.finish_reason, FinishReason::Filtered);
    assert_eq!(result.raw_finish_reason.as_deref(), Some("SAFETY"));
}

#[tokio::test]
async fn test_gemini_transport_failure_hides_api_key() {
    use std::io::{Read, Write};

    // Answers the model lookup once, then the port is closed
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let model_lookup = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
            )
            .unwrap();
    });

    let mut settings = provider_config(ProviderKind::Gemini, &base_url);
    settings.api_key = Some("gemini-secret-key".to_string());
    let adapter = connect(ProviderKind::Gemini, &settings).await;
    model_lookup.join().unwrap();

    let result = adapter.generate(&GenerationRequest::new("hello")).await;

    let error = result.error.expect("connection refused is reported");
    assert!(error.starts_with("HTTP request failed"), "{error}");
    assert!(!error.contains("gemini-secret-key"), "{error}");
}

// ============================================================================
// Hunyuan
// ============================================================================

#[tokio::test]
async fn test_hunyuan_signed_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("x-tc-action", "ChatCompletions"))
        .and(header("x-tc-version", "2023-09-01"))
        .and(header("x-tc-region", "ap-beijing"))
        .and(header_exists("x-tc-timestamp"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({"Model": "hunyuan-lite"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Choices": [{
                    "Message": {"Role": "assistant", "Content": "混元回答"},
                    "FinishReason": "stop"
                }],
                "RequestId": "req-1"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Hunyuan, &provider_config(ProviderKind::Hunyuan, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert_eq!(result.text.as_deref(), Some("混元回答"));
}

#[tokio::test]
async fn test_hunyuan_risk_control_is_filtered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Error": {"Code": "OperationDenied.RiskControl", "Message": "risk"},
                "RequestId": "req-2"
            }
        })))
        .mount(&server)
        .await;

    let adapter = connect(ProviderKind::Hunyuan, &provider_config(ProviderKind::Hunyuan, &server.uri())).await;
    let result = adapter.generate(&GenerationRequest::new("analyse")).await;

    assert!(result.is_safety_blocked());
}

#[tokio::test]
async fn test_hunyuan_requires_both_secrets() {
    let mut settings = provider_config(ProviderKind::Hunyuan, "https://hunyuan.tencentcloudapi.com");
    settings.secret_key = None;

    let err = ProviderAdapter::connect(
        ProviderKind::Hunyuan,
        &settings,
        Duration::from_secs(5),
        RetryConfig::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        Error::MissingCredential { variable: "TENCENT_SECRET_KEY", .. }
    ));
}
