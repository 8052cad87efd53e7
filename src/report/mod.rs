//! Report aggregate and its JSON, Markdown and HTML renderings
//!
//! Reports for a run live in a dated folder next to the processing cache:
//! `<report_dir>/<YYYYMMDD>/{processed_cache.json, report_intermediate.json,
//! report.json, report.md, report.html}`.

use chrono::{Local, NaiveDate, NaiveDateTime};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::ProcessedArticle;
use crate::storage::write_json_atomic;

const MARKDOWN_TEMPLATE: &str = include_str!("../../templates/report.md.hbs");
const HTML_TEMPLATE: &str = include_str!("../../templates/report.html.hbs");

pub const CACHE_FILE: &str = "processed_cache.json";
pub const INTERMEDIATE_FILE: &str = "report_intermediate.json";
pub const JSON_FILE: &str = "report.json";
pub const MARKDOWN_FILE: &str = "report.md";
pub const HTML_FILE: &str = "report.html";

/// Aggregate over one run's processed articles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub statistics: ReportStatistics,
    /// Valid articles only
    pub articles: Vec<ProcessedArticle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_articles: usize,
    pub valid_articles: usize,
    pub invalid_articles: usize,
    pub processing_date: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStatistics {
    pub by_category: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
}

/// Name and count, for rendering ranked statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedCount {
    pub name: String,
    pub count: usize,
}

impl Report {
    /// Build the aggregate from every record of a run
    pub fn build(records: &[ProcessedArticle]) -> Self {
        let articles: Vec<ProcessedArticle> =
            records.iter().filter(|r| r.is_valid()).cloned().collect();

        let mut statistics = ReportStatistics::default();
        for article in &articles {
            *statistics
                .by_category
                .entry(article.processed.category.clone())
                .or_default() += 1;
            *statistics
                .by_source
                .entry(article.original.source_domain.clone())
                .or_default() += 1;
        }

        Self {
            summary: ReportSummary {
                total_articles: records.len(),
                valid_articles: articles.len(),
                invalid_articles: records.len() - articles.len(),
                processing_date: Local::now().naive_local(),
            },
            statistics,
            articles,
        }
    }

    /// Categories by count, largest first; ties by name
    pub fn ranked_categories(&self) -> Vec<RankedCount> {
        rank(&self.statistics.by_category)
    }

    /// Sources by count, largest first; ties by name
    pub fn ranked_sources(&self) -> Vec<RankedCount> {
        rank(&self.statistics.by_source)
    }
}

fn rank(counts: &BTreeMap<String, usize>) -> Vec<RankedCount> {
    let mut ranked: Vec<RankedCount> = counts
        .iter()
        .map(|(name, count)| RankedCount {
            name: name.clone(),
            count: *count,
        })
        .collect();
    // Stable sort keeps the map's name order among equal counts
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked
}

/// Template data for rendering
#[derive(Debug, Serialize)]
struct ReportView<'a> {
    generated_at: String,
    summary: &'a ReportSummary,
    categories: Vec<RankedCount>,
    sources: Vec<RankedCount>,
    articles: Vec<ArticleView<'a>>,
}

#[derive(Debug, Serialize)]
struct ArticleView<'a> {
    index: usize,
    heading: &'a str,
    title: &'a str,
    category: &'a str,
    source: &'a str,
    authors: String,
    date_publish: &'a str,
    url: &'a str,
    description_zh: &'a str,
    key_points: &'a [String],
    summary_zh: &'a str,
    maintext_zh: &'a str,
}

impl<'a> ReportView<'a> {
    fn new(report: &'a Report) -> Self {
        let articles = report
            .articles
            .iter()
            .enumerate()
            .map(|(i, a)| ArticleView {
                index: i + 1,
                heading: if a.processed.title_zh.is_empty() {
                    &a.original.title
                } else {
                    &a.processed.title_zh
                },
                title: &a.original.title,
                category: &a.processed.category,
                source: &a.original.source_domain,
                authors: if a.original.authors.is_empty() {
                    "未知".to_string()
                } else {
                    a.original.authors.join(", ")
                },
                date_publish: &a.original.date_publish,
                url: &a.original.url,
                description_zh: &a.processed.description_zh,
                key_points: &a.processed.key_points,
                summary_zh: &a.processed.summary_zh,
                maintext_zh: &a.processed.maintext_zh,
            })
            .collect();

        Self {
            generated_at: report
                .summary
                .processing_date
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            summary: &report.summary,
            categories: report.ranked_categories(),
            sources: report.ranked_sources(),
            articles,
        }
    }
}

/// Paths of the final report files
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
    pub html: PathBuf,
}

/// Writes reports into one dated run directory
pub struct ReportWriter {
    /// Markdown output is not HTML-escaped
    markdown: Handlebars<'static>,

    html: Handlebars<'static>,

    dir: PathBuf,
}

impl ReportWriter {
    /// Writer for `<report_root>/<YYYYMMDD>`
    pub fn for_date(report_root: &Path, date: NaiveDate) -> Result<Self> {
        Self::new(report_root.join(date.format("%Y%m%d").to_string()))
    }

    /// Writer for an explicit run directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        let mut markdown = Handlebars::new();
        markdown.register_escape_fn(handlebars::no_escape);
        markdown.register_template_string("report", MARKDOWN_TEMPLATE)?;

        let mut html = Handlebars::new();
        html.register_template_string("report", HTML_TEMPLATE)?;

        fs::create_dir_all(&dir)?;

        Ok(Self {
            markdown,
            html,
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the processing cache for this run
    pub fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn intermediate_path(&self) -> PathBuf {
        self.dir.join(INTERMEDIATE_FILE)
    }

    pub fn render_markdown(&self, report: &Report) -> Result<String> {
        Ok(self.markdown.render("report", &ReportView::new(report))?)
    }

    pub fn render_html(&self, report: &Report) -> Result<String> {
        Ok(self.html.render("report", &ReportView::new(report))?)
    }

    /// Progress snapshot, overwritten on every call
    pub fn write_intermediate(&self, records: &[ProcessedArticle]) -> Result<PathBuf> {
        let path = self.intermediate_path();
        write_json_atomic(&path, &Report::build(records))?;
        debug!(path = %path.display(), records = records.len(), "Intermediate report saved");
        Ok(path)
    }

    /// Write report.json, report.md and report.html, then drop the snapshot
    pub fn write_final(&self, report: &Report) -> Result<ReportPaths> {
        let paths = ReportPaths {
            json: self.dir.join(JSON_FILE),
            markdown: self.dir.join(MARKDOWN_FILE),
            html: self.dir.join(HTML_FILE),
        };

        write_json_atomic(&paths.json, report)?;
        fs::write(&paths.markdown, self.render_markdown(report)?)?;
        fs::write(&paths.html, self.render_html(report)?)?;

        let intermediate = self.intermediate_path();
        if intermediate.exists() {
            if let Err(e) = fs::remove_file(&intermediate) {
                tracing::warn!(path = %intermediate.display(), error = %e, "Could not remove intermediate report");
            }
        }

        info!(dir = %self.dir.display(), "Reports written");
        Ok(paths)
    }
}
