//! Answer recovery for deep-reasoning responses
//!
//! With reasoning mode on, some providers leave the normal content field empty
//! and put everything in a separate reasoning field. The recovery here is
//! heuristic and can return an imperfect answer; it never returns nothing when
//! reasoning text exists.

use regex::Regex;
use std::sync::LazyLock;

/// Final-answer markers, tried in order; the last match of the first
/// pattern that matches anywhere wins.
static ANSWER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)```json\s*(\{.*?\})\s*```",
        r"(?i)final\s+(?:answer|choice)\s*[:：]\s*([^\n]+)",
        r"最终(?:答案|选择|回答|结果)\s*[:：是为]\s*([^\n]+)",
        r"(?s)(\{.*\})",
        r"“([^”\n]{1,80})”",
        r#""([^"\n]{1,80})""#,
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Pick the answer text from a content field and an optional reasoning field
///
/// Returns `None` only when both are empty.
pub fn resolve_answer(content: Option<&str>, reasoning: Option<&str>) -> Option<String> {
    if let Some(text) = content.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(text.to_string());
    }

    let reasoning = reasoning.map(str::trim).filter(|t| !t.is_empty())?;
    Some(extract_from_reasoning(reasoning))
}

/// Scan reasoning text for a final-answer marker, falling back to the whole text
pub fn extract_from_reasoning(reasoning: &str) -> String {
    for pattern in ANSWER_PATTERNS.iter() {
        let last = pattern
            .captures_iter(reasoning)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|s| !s.is_empty())
            .last();
        if let Some(answer) = last {
            tracing::debug!(pattern = pattern.as_str(), "Recovered answer from reasoning text");
            return answer.to_string();
        }
    }

    reasoning.trim().to_string()
}
