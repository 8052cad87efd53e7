// Core data structures for ngdigest

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Category assigned when the model omits one, and to safety placeholders
pub const FALLBACK_CATEGORY: &str = "other";

/// Summary written for articles the provider refused to process
pub const SAFETY_NOTICE: &str = "内容被安全过滤器阻止，无法进行AI处理";

/// Reason recorded for articles the model marked invalid
pub const FILTERED_REASON: &str = "非严肃新闻（花边/娱乐/体育/养生保健等）";

/// Scraped news article, as produced by the crawler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub maintext: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_publish: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_domain: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub homepage_source: String,
}

impl Article {
    /// Stable cache key: SHA256 of the URL, or of `{title}_{source_domain}` without one
    pub fn id(&self) -> String {
        let key = if self.url.trim().is_empty() {
            format!("{}_{}", self.title, self.source_domain)
        } else {
            self.url.clone()
        };
        format!("{:x}", Sha256::digest(key.as_bytes()))
    }

    /// Title for log lines
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }
}

/// Fields derived by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFields {
    pub is_valid: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub title_zh: String,
    #[serde(default)]
    pub description_zh: String,
    #[serde(default)]
    pub summary_zh: String,
    #[serde(default)]
    pub maintext_zh: String,
}

impl ProcessedFields {
    /// Invalid record: every derived field empty
    pub fn invalid() -> Self {
        Self::default()
    }

    /// True when an invalid record carries no derived content
    pub fn satisfies_invalid_invariant(&self) -> bool {
        self.is_valid
            || (self.category.is_empty()
                && self.key_points.is_empty()
                && self.title_zh.is_empty()
                && self.description_zh.is_empty()
                && self.summary_zh.is_empty()
                && self.maintext_zh.is_empty())
    }
}

/// Provenance of a processed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub processed_at: NaiveDateTime,
    /// `{provider}-{model}` tag, or `blocked_by_safety_filter_{provider}`
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_reason: Option<String>,
}

impl ProcessingMetadata {
    fn now(source: String, filtered_reason: Option<String>) -> Self {
        Self {
            processed_at: Local::now().naive_local(),
            source,
            filtered_reason,
        }
    }
}

/// Article together with the model's verdict, the unit stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub original: Article,
    pub processed: ProcessedFields,
    pub metadata: ProcessingMetadata,
}

impl ProcessedArticle {
    /// Merge a parsed model response into a record
    ///
    /// An invalid verdict discards whatever derived fields the model sent.
    pub fn from_contract(article: &Article, contract: ArticleContract, source_tag: String) -> Self {
        if !contract.is_valid {
            return Self {
                original: article.clone(),
                processed: ProcessedFields::invalid(),
                metadata: ProcessingMetadata::now(source_tag, Some(FILTERED_REASON.to_string())),
            };
        }

        let category = contract
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

        Self {
            original: article.clone(),
            processed: ProcessedFields {
                is_valid: true,
                category,
                key_points: contract.key_points,
                title_zh: contract.title_zh,
                description_zh: contract.description_zh,
                summary_zh: contract.summary_zh,
                maintext_zh: contract.maintext_zh,
            },
            metadata: ProcessingMetadata::now(source_tag, None),
        }
    }

    /// Minimal valid record for content the provider refused to handle
    pub fn safety_placeholder(article: &Article, provider: &str) -> Self {
        Self {
            original: article.clone(),
            processed: ProcessedFields {
                is_valid: true,
                category: FALLBACK_CATEGORY.to_string(),
                summary_zh: SAFETY_NOTICE.to_string(),
                ..ProcessedFields::default()
            },
            metadata: ProcessingMetadata::now(format!("blocked_by_safety_filter_{provider}"), None),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.processed.is_valid
    }
}

/// JSON object the prompt instructs the model to return
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ArticleContract {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_valid: bool,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub key_points: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title_zh: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description_zh: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary_zh: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub maintext_zh: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Number(i64),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Flag::Number(n)) => n != 0,
        None => false,
    })
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Points {
        List(Vec<String>),
        One(String),
    }

    Ok(match Option::<Points>::deserialize(deserializer)? {
        Some(Points::List(items)) => items,
        Some(Points::One(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}
