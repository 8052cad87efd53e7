//! Resumable batch processing of scraped articles
//!
//! Articles are handled one at a time, in input order. Every new record is
//! written through to the [`ProcessingCache`] before the next article starts,
//! so an interrupted run picks up where it stopped. Per-article failures are
//! logged and skipped; only a cache that can no longer be written ends the run.

pub mod contract;
pub mod prompt;

use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::error::Result;
use crate::llm::{GenerationRequest, TextGenerator};
use crate::models::{Article, ProcessedArticle};
use crate::report::ReportWriter;
use crate::storage::ProcessingCache;
use crate::utils::truncate_for_log;

pub use self::contract::{parse_contract, ContractError};
pub use self::prompt::{PromptTemplate, TemplateSource};

/// Raw model output longer than this is cut in log lines
const LOG_SNIPPET_CHARS: usize = 200;

/// Knobs of one batch run
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub maintext_limit: usize,
    pub min_maintext_chars: usize,
    pub save_interval: usize,
    pub request_delay: Duration,
}

impl From<&BatchConfig> for BatchSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            maintext_limit: config.maintext_limit,
            min_maintext_chars: config.min_maintext_chars,
            save_interval: config.save_interval.max(1),
            request_delay: config.request_delay(),
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    /// Articles in the input
    pub total: usize,
    /// Served from the cache without a provider call
    pub reused: usize,
    /// New records written this run, safety placeholders included
    pub newly_processed: usize,
    /// Maintext missing or too short to be worth a call
    pub skipped_short: usize,
    /// Provider error or unparseable response; retried on the next run
    pub failed: usize,
    /// Provider refused the content; kept as a placeholder record
    pub safety_blocked: usize,
    /// Repeated ids within the same input
    pub duplicates: usize,
}

/// Result of [`BatchProcessor::run`]
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Cached and new records, in input order
    pub records: Vec<ProcessedArticle>,
    pub stats: BatchStats,
    /// The run stopped early on a cancellation signal
    pub interrupted: bool,
}

/// What happened to a single article
enum Step {
    Reused(ProcessedArticle),
    Processed(ProcessedArticle),
    SafetyBlocked(ProcessedArticle),
    SkippedShort,
    Failed,
}

#[derive(Default)]
struct RunState {
    records: Vec<ProcessedArticle>,
    stats: BatchStats,
    seen: HashSet<String>,
}

/// Drives articles through a [`TextGenerator`] into the processing cache
pub struct BatchProcessor<'a> {
    generator: &'a dyn TextGenerator,
    template: &'a PromptTemplate,
    cache: &'a mut ProcessingCache,
    snapshots: Option<&'a ReportWriter>,
    settings: BatchSettings,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        template: &'a PromptTemplate,
        cache: &'a mut ProcessingCache,
        settings: BatchSettings,
    ) -> Self {
        Self {
            generator,
            template,
            cache,
            snapshots: None,
            settings,
        }
    }

    /// Write intermediate report snapshots through `writer`
    pub fn with_snapshots(mut self, writer: &'a ReportWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    /// Process `articles`, stopping early once `cancel` turns true
    ///
    /// Finalization (cache re-persist and a last snapshot) runs whether the
    /// loop finished, was cancelled or failed. A cache write failure is
    /// returned as an error after finalization.
    pub async fn run(
        &mut self,
        articles: &[Article],
        mut cancel: watch::Receiver<bool>,
    ) -> Result<BatchOutcome> {
        let mut state = RunState {
            stats: BatchStats {
                total: articles.len(),
                ..BatchStats::default()
            },
            ..RunState::default()
        };

        info!(
            provider = self.generator.provider().as_str(),
            model = self.generator.model(),
            articles = articles.len(),
            cached = self.cache.len(),
            "Starting batch"
        );

        let outcome = self.process_all(articles, &mut cancel, &mut state).await;
        let finalized = self.finalize(&state.records);

        let interrupted = outcome?;
        finalized?;

        let stats = &state.stats;
        info!(
            total = stats.total,
            reused = stats.reused,
            newly_processed = stats.newly_processed,
            safety_blocked = stats.safety_blocked,
            skipped_short = stats.skipped_short,
            failed = stats.failed,
            duplicates = stats.duplicates,
            interrupted,
            "Batch finished"
        );

        Ok(BatchOutcome {
            records: state.records,
            stats: state.stats,
            interrupted,
        })
    }

    /// Returns whether the loop was cancelled
    async fn process_all(
        &mut self,
        articles: &[Article],
        cancel: &mut watch::Receiver<bool>,
        state: &mut RunState,
    ) -> Result<bool> {
        let total = articles.len();

        for (i, article) in articles.iter().enumerate() {
            if *cancel.borrow() {
                info!(processed = i, total, "Cancellation requested, stopping batch");
                return Ok(true);
            }

            let id = article.id();
            if !state.seen.insert(id.clone()) {
                debug!(article_id = %id, title = article.display_title(), "Duplicate article in input");
                state.stats.duplicates += 1;
                continue;
            }

            debug!(index = i + 1, total, title = article.display_title(), "Processing article");

            let called = !self.cache.contains(&id) && !self.too_short(article);
            match self.process_one(&id, article).await {
                Step::Reused(record) => {
                    state.stats.reused += 1;
                    state.records.push(record);
                }
                Step::SkippedShort => state.stats.skipped_short += 1,
                Step::Failed => state.stats.failed += 1,
                Step::Processed(record) => {
                    self.store(id, record, state)?;
                }
                Step::SafetyBlocked(record) => {
                    state.stats.safety_blocked += 1;
                    self.store(id, record, state)?;
                }
            }

            if called && i + 1 < total && self.pause(cancel).await {
                info!(processed = i + 1, total, "Cancellation requested, stopping batch");
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn too_short(&self, article: &Article) -> bool {
        article.maintext.trim().chars().count() < self.settings.min_maintext_chars
    }

    async fn process_one(&self, id: &str, article: &Article) -> Step {
        if let Some(cached) = self.cache.get(id) {
            debug!(article_id = %id, "Using cached result");
            return Step::Reused(cached.clone());
        }

        if self.too_short(article) {
            debug!(
                article_id = %id,
                chars = article.maintext.chars().count(),
                "Maintext too short, skipping"
            );
            return Step::SkippedShort;
        }

        let prompt = self.template.render(article, self.settings.maintext_limit);
        let result = self.generator.generate(&GenerationRequest::new(prompt)).await;

        if result.is_safety_blocked() {
            warn!(
                article_id = %id,
                title = article.display_title(),
                "Content blocked by safety filter, keeping placeholder record"
            );
            return Step::SafetyBlocked(ProcessedArticle::safety_placeholder(
                article,
                self.generator.provider().as_str(),
            ));
        }

        if let Some(error) = result.error {
            warn!(article_id = %id, title = article.display_title(), error = %error, "Processing failed");
            return Step::Failed;
        }

        let text = result.text.unwrap_or_default();
        match parse_contract(&text) {
            Ok(contract) => Step::Processed(ProcessedArticle::from_contract(
                article,
                contract,
                self.generator.source_tag(),
            )),
            Err(e) => {
                warn!(
                    article_id = %id,
                    title = article.display_title(),
                    error = %e,
                    response = %truncate_for_log(&text, LOG_SNIPPET_CHARS),
                    "Could not parse model response"
                );
                Step::Failed
            }
        }
    }

    /// Write through to the cache; a failure here ends the run
    fn store(&mut self, id: String, record: ProcessedArticle, state: &mut RunState) -> Result<()> {
        info!(
            article_id = %id,
            valid = record.is_valid(),
            category = %record.processed.category,
            "Article processed"
        );
        self.cache.insert(id, record.clone())?;
        state.records.push(record);
        state.stats.newly_processed += 1;

        if state.stats.newly_processed % self.settings.save_interval == 0 {
            self.snapshot(&state.records);
        }
        Ok(())
    }

    /// Sleep between provider calls; returns true if cancelled meanwhile
    async fn pause(&self, cancel: &mut watch::Receiver<bool>) -> bool {
        if self.settings.request_delay.is_zero() {
            return *cancel.borrow();
        }

        tokio::select! {
            _ = tokio::time::sleep(self.settings.request_delay) => {}
            Ok(()) = cancel.changed() => {}
        }
        *cancel.borrow()
    }

    fn snapshot(&self, records: &[ProcessedArticle]) {
        if records.is_empty() {
            return;
        }
        if let Some(writer) = self.snapshots {
            if let Err(e) = writer.write_intermediate(records) {
                warn!(error = %e, "Could not write intermediate report");
            }
        }
    }

    fn finalize(&self, records: &[ProcessedArticle]) -> Result<()> {
        self.snapshot(records);
        self.cache.persist()
    }
}
