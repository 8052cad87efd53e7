//! JSON-contract extraction from free-form model output
//!
//! Models wrap the requested object in code fences, surround it with prose, or
//! emit slightly broken JSON. Extraction picks the most likely slice; a single
//! repair pass handles the common defects before giving up.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::models::ArticleContract;

static FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z0-9_-]*)[ \t]*\r?\n?(.*?)```").unwrap());

static TRAILING_COMMA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

static SMART_QUOTE_OPEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([{\[,:]\s*)[“”]"#).unwrap());

static SMART_QUOTE_CLOSE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[“”](\s*[:,}\]])"#).unwrap());

/// Why a response could not be turned into a contract
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("response is empty")]
    Empty,

    #[error("no JSON object found in response")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse the contract object out of raw model text
pub fn parse_contract(text: &str) -> Result<ArticleContract, ContractError> {
    if text.trim().is_empty() {
        return Err(ContractError::Empty);
    }

    let slice = extract_json(text).ok_or(ContractError::NoJson)?;

    match serde_json::from_str::<ArticleContract>(slice) {
        Ok(contract) => Ok(contract),
        Err(first) => {
            let repaired = repair_json(slice);
            if repaired == slice {
                return Err(first.into());
            }
            tracing::debug!(error = %first, "Contract JSON repaired before parsing");
            Ok(serde_json::from_str::<ArticleContract>(&repaired)?)
        }
    }
}

/// Locate the JSON object in model output
///
/// In order: a fenced `json` block; any fenced block that parses as JSON;
/// the span from the first `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let fences: Vec<(&str, &str)> = FENCE_REGEX
        .captures_iter(text)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str().trim())))
        .collect();

    if let Some((_, body)) = fences.iter().find(|(lang, _)| lang.eq_ignore_ascii_case("json")) {
        return Some(brace_span(body).unwrap_or(body));
    }

    if let Some((_, body)) = fences
        .iter()
        .find(|(_, body)| serde_json::from_str::<serde_json::Value>(body).is_ok())
    {
        return Some(body);
    }

    brace_span(text)
}

fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Fix common JSON defects from LLM output
///
/// Removes trailing commas, turns smart quotes used as delimiters into plain
/// quotes, and escapes or drops control characters.
pub fn repair_json(json: &str) -> String {
    let text = SMART_QUOTE_OPEN_REGEX.replace_all(json, "$1\"");
    let text = SMART_QUOTE_CLOSE_REGEX.replace_all(&text, "\"$1");
    let text = TRAILING_COMMA_REGEX.replace_all(&text, "$1");

    let mut fixed = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for c in text.chars() {
        if escape_next {
            fixed.push(c);
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
                fixed.push(c);
            }
            '"' => {
                in_string = !in_string;
                fixed.push(c);
            }
            '\n' if in_string => fixed.push_str("\\n"),
            '\t' if in_string => fixed.push_str("\\t"),
            '\r' if in_string => {}
            c if c.is_control() && !matches!(c, '\n' | '\t' | '\r') => {}
            _ => fixed.push(c),
        }
    }

    fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT: &str = r#"{"is_valid": true, "category": "经济", "key_points": ["a", "b"], "title_zh": "奈拉反弹"}"#;

    fn expected() -> ArticleContract {
        serde_json::from_str(OBJECT).unwrap()
    }

    #[test]
    fn test_json_fence() {
        let text = format!("Here you go:\n```json\n{OBJECT}\n```\nAnything else?");
        assert_eq!(parse_contract(&text).unwrap(), expected());
    }

    #[test]
    fn test_bare_fence() {
        let text = format!("```\n{OBJECT}\n```");
        assert_eq!(parse_contract(&text).unwrap(), expected());
    }

    #[test]
    fn test_prose_with_braces() {
        let text = format!("I analysed the article and produced: {OBJECT} Hope this helps.");
        assert_eq!(parse_contract(&text).unwrap(), expected());
    }

    #[test]
    fn test_raw_json() {
        assert_eq!(parse_contract(OBJECT).unwrap(), expected());
    }

    #[test]
    fn test_bare_fence_skips_non_json_blocks() {
        let text = format!("```\nnot json\n```\n```\n{OBJECT}\n```");
        assert_eq!(extract_json(&text), Some(OBJECT));
    }

    #[test]
    fn test_json_fence_preferred_over_other_blocks() {
        let text = format!("```\n{{\"is_valid\": false}}\n```\n```json\n{OBJECT}\n```");
        assert_eq!(parse_contract(&text).unwrap(), expected());
    }

    #[test]
    fn test_repairs_trailing_commas_and_newlines() {
        let text = "{\"is_valid\": true, \"summary_zh\": \"第一行\n第二行\", \"key_points\": [\"a\",],}";
        let contract = parse_contract(text).unwrap();
        assert!(contract.is_valid);
        assert_eq!(contract.summary_zh, "第一行\n第二行");
        assert_eq!(contract.key_points, vec!["a".to_string()]);
    }

    #[test]
    fn test_repairs_smart_quote_delimiters_only() {
        let text = "{“is_valid”: true, \"title_zh\": \"他说“改革”很重要\"}";
        let contract = parse_contract(text).unwrap();
        assert!(contract.is_valid);
        assert_eq!(contract.title_zh, "他说“改革”很重要");
    }

    #[test]
    fn test_unparseable_is_error() {
        assert!(matches!(parse_contract("   "), Err(ContractError::Empty)));
        assert!(matches!(parse_contract("no object here"), Err(ContractError::NoJson)));
        assert!(matches!(
            parse_contract("{\"is_valid\": tru"),
            Err(ContractError::NoJson) | Err(ContractError::Malformed(_))
        ));
        assert!(matches!(
            parse_contract("{is_valid: yes}"),
            Err(ContractError::Malformed(_))
        ));
    }
}
