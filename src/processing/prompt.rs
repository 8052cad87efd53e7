//! Prompt template with `{name}` placeholders
//!
//! `{{` and `}}` stand for literal braces, so JSON examples can be embedded
//! in the template. Placeholders are checked when the template is loaded.

use std::fs;
use tracing::{info, warn};

use crate::config::PromptConfig;
use crate::error::{Error, Result};
use crate::models::Article;
use crate::utils::truncate_chars;

const DEFAULT_TEMPLATE: &str = include_str!("../../templates/prompt_default.txt");

/// Appended to maintext cut at the length limit
pub const TRUNCATION_MARKER: &str = "\n\n[文章内容较长，已截断]";

/// Shown when an article lists no authors
const UNKNOWN_AUTHORS: &str = "未知";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Authors,
    DatePublish,
    Source,
    MaintextPreview,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "title" => Self::Title,
            "description" => Self::Description,
            "authors" => Self::Authors,
            "date_publish" => Self::DatePublish,
            "source" => Self::Source,
            "maintext_preview" => Self::MaintextPreview,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Where the active template came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    Inline,
    File(std::path::PathBuf),
    BuiltIn,
}

/// Parsed prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse template text, rejecting unknown placeholders and stray braces
    pub fn parse(text: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(Error::config(format!(
                                    "prompt template: unclosed placeholder {{{name}"
                                )))
                            }
                        }
                    }
                    let field = Field::parse(name.trim()).ok_or_else(|| {
                        Error::config(format!("prompt template: unknown placeholder {{{name}}}"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' => {
                    return Err(Error::config(
                        "prompt template: single '}' must be written as '}}'",
                    ))
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Resolve the template: inline text, else the template file, else the built-in default
    pub fn load(config: &PromptConfig) -> Result<(Self, TemplateSource)> {
        if let Some(inline) = config.template.as_deref().filter(|t| !t.trim().is_empty()) {
            info!("Using prompt template from environment");
            return Ok((Self::parse(inline.trim())?, TemplateSource::Inline));
        }

        let path = &config.template_file;
        if path.is_file() {
            match fs::read_to_string(path) {
                Ok(text) => {
                    info!(path = %path.display(), "Using prompt template file");
                    return Ok((Self::parse(text.trim())?, TemplateSource::File(path.clone())));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read prompt template, using built-in default");
                }
            }
        } else {
            warn!(path = %path.display(), "Prompt template file not found, using built-in default");
        }

        Ok((Self::builtin()?, TemplateSource::BuiltIn))
    }

    /// The template shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::parse(DEFAULT_TEMPLATE.trim())
    }

    /// Fill placeholders from an article
    pub fn render(&self, article: &Article, maintext_limit: usize) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(Field::Title) => out.push_str(&article.title),
                Segment::Field(Field::Description) => out.push_str(&article.description),
                Segment::Field(Field::Authors) => {
                    if article.authors.is_empty() {
                        out.push_str(UNKNOWN_AUTHORS);
                    } else {
                        out.push_str(&article.authors.join(", "));
                    }
                }
                Segment::Field(Field::DatePublish) => out.push_str(&article.date_publish),
                Segment::Field(Field::Source) => out.push_str(&article.source_domain),
                Segment::Field(Field::MaintextPreview) => {
                    out.push_str(&maintext_preview(&article.maintext, maintext_limit))
                }
            }
        }
        out
    }
}

/// Maintext cut to `limit` characters, marked when cut
pub fn maintext_preview(maintext: &str, limit: usize) -> String {
    let head = truncate_chars(maintext, limit);
    if head.len() < maintext.len() {
        format!("{head}{TRUNCATION_MARKER}")
    } else {
        head.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn article() -> Article {
        Article {
            title: "Naira rebounds".into(),
            description: "CBN intervention".into(),
            maintext: "The naira gained ground...".into(),
            authors: vec!["Ada Obi".into(), "Musa Bello".into()],
            date_publish: "2025-01-20 08:00:00".into(),
            source_domain: "businessday.ng".into(),
            url: "https://businessday.ng/x".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_fields_and_escapes() {
        let template =
            PromptTemplate::parse("T={title} A={authors} S={source} J={{\"k\": 1}}").unwrap();
        assert_eq!(
            template.render(&article(), 3000),
            "T=Naira rebounds A=Ada Obi, Musa Bello S=businessday.ng J={\"k\": 1}"
        );
    }

    #[test]
    fn test_unknown_authors() {
        let template = PromptTemplate::parse("{authors}").unwrap();
        let mut a = article();
        a.authors.clear();
        assert_eq!(template.render(&a, 3000), "未知");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let err = PromptTemplate::parse("Hello {weather}").unwrap_err();
        assert!(err.to_string().contains("weather"));
    }

    #[test]
    fn test_stray_braces_rejected() {
        assert!(PromptTemplate::parse("{title").is_err());
        assert!(PromptTemplate::parse("oops }").is_err());
    }

    #[test]
    fn test_maintext_truncation() {
        let text = "尼".repeat(3005);
        let preview = maintext_preview(&text, 3000);
        assert!(preview.ends_with(TRUNCATION_MARKER));
        assert_eq!(preview.chars().count(), 3000 + TRUNCATION_MARKER.chars().count());

        assert_eq!(maintext_preview("short", 3000), "short");
        let exact = "a".repeat(3000);
        assert_eq!(maintext_preview(&exact, 3000), exact);
    }

    #[test]
    fn test_builtin_template_covers_all_fields() {
        let template = PromptTemplate::builtin().unwrap();
        let rendered = template.render(&article(), 3000);
        assert!(rendered.contains("Naira rebounds"));
        assert!(rendered.contains("businessday.ng"));
        assert!(rendered.contains("The naira gained ground"));
        assert!(rendered.contains("\"is_valid\""));
    }

    #[test]
    fn test_load_order() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("prompt_template.txt");
        std::fs::write(&file, "FILE {title}").unwrap();

        let inline = PromptConfig {
            template: Some("INLINE {title}".into()),
            template_file: file.clone(),
        };
        let (t, source) = PromptTemplate::load(&inline).unwrap();
        assert_eq!(source, TemplateSource::Inline);
        assert_eq!(t.render(&article(), 10), "INLINE Naira rebounds");

        let from_file = PromptConfig {
            template: None,
            template_file: file.clone(),
        };
        let (t, source) = PromptTemplate::load(&from_file).unwrap();
        assert_eq!(source, TemplateSource::File(file));
        assert_eq!(t.render(&article(), 10), "FILE Naira rebounds");

        let missing = PromptConfig {
            template: None,
            template_file: dir.path().join("absent.txt"),
        };
        let (_, source) = PromptTemplate::load(&missing).unwrap();
        assert_eq!(source, TemplateSource::BuiltIn);
    }
}
