//! Per-provider wire formats

pub mod claude;
pub mod dashscope;
pub mod gemini;
pub mod hunyuan;
pub mod ollama;
pub mod openai_compat;

use serde::Serialize;

use super::SYSTEM_PROMPT;

/// Chat message in the OpenAI-style shape shared by most providers
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// System prompt followed by the user prompt
pub fn chat_messages(prompt: &str) -> Vec<ChatMessage<'_>> {
    vec![
        ChatMessage {
            role: "system",
            content: SYSTEM_PROMPT,
        },
        ChatMessage {
            role: "user",
            content: prompt,
        },
    ]
}

/// Pull `code` out of a JSON error body, at the top level or under `error`
pub(crate) fn error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let code = value
        .get("code")
        .or_else(|| value.get("error").and_then(|e| e.get("code")))?;
    match code {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_messages_order() {
        let messages = chat_messages("Summarize this");
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "Summarize this");
    }

    #[test]
    fn test_error_code_shapes() {
        assert_eq!(
            error_code(r#"{"code":"DataInspectionFailed","message":"x"}"#).as_deref(),
            Some("DataInspectionFailed")
        );
        assert_eq!(
            error_code(r#"{"error":{"code":"1301","message":"敏感"}}"#).as_deref(),
            Some("1301")
        );
        assert_eq!(error_code(r#"{"error":{"code":1301}}"#).as_deref(), Some("1301"));
        assert_eq!(error_code("not json"), None);
    }
}
