use anyhow::{bail, Context, Result};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::watch;

use ngdigest::config::{Config, ProviderKind};
use ngdigest::llm::{ProviderAdapter, TextGenerator};
use ngdigest::processing::{BatchProcessor, BatchSettings, PromptTemplate, TemplateSource};
use ngdigest::report::{Report, ReportWriter};
use ngdigest::storage::{load_articles, resolve_articles_file, ProcessingCache};
use ngdigest::utils::retry::RetryConfig;

/// Command-line overrides for `process`
#[derive(Debug, Default)]
pub struct ProcessArgs {
    pub provider: Option<String>,
    pub articles: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub report_dir: Option<PathBuf>,
}

pub async fn process(mut config: Config, args: ProcessArgs) -> Result<()> {
    if let Some(name) = args.provider {
        config.provider = name.parse()?;
    }
    if let Some(articles) = args.articles {
        config.paths.articles_file = Some(articles);
    }
    if let Some(dir) = args.data_dir {
        config.paths.data_dir = dir;
    }
    if let Some(dir) = args.report_dir {
        config.paths.report_dir = dir;
    }

    println!("Nigerian News Digest");
    println!("====================");

    let kind = select_provider(&config)?;
    let settings = config.provider_config(kind)?;
    let adapter = ProviderAdapter::connect(
        kind,
        settings,
        config.batch.request_timeout(),
        RetryConfig::new(config.batch.max_retries),
    )
    .await
    .with_context(|| format!("Failed to initialize provider {kind}"))?;
    println!("Provider: {} ({})", kind.display_name(), adapter.model());

    let (template, source) =
        PromptTemplate::load(&config.prompt).context("Failed to load prompt template")?;
    match &source {
        TemplateSource::Inline => println!("Prompt: inline template"),
        TemplateSource::File(path) => println!("Prompt: {}", path.display()),
        TemplateSource::BuiltIn => println!("Prompt: built-in template"),
    }

    let articles_file = resolve_articles_file(&config.paths)?;
    let articles = load_articles(&articles_file)
        .with_context(|| format!("Failed to load articles from {}", articles_file.display()))?;
    println!("Articles: {} ({})", articles.len(), articles_file.display());

    let today = chrono::Local::now().date_naive();
    let writer = ReportWriter::for_date(&config.paths.report_dir, today)
        .context("Failed to prepare report directory")?;
    let mut cache = ProcessingCache::load(writer.cache_path());
    if !cache.is_empty() {
        println!("Cache: {} articles already processed", cache.len());
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if forward_interrupts(tokio::signal::ctrl_c, cancel_tx).await {
            std::process::exit(130);
        }
    });

    let outcome = BatchProcessor::new(
        &adapter,
        &template,
        &mut cache,
        BatchSettings::from(&config.batch),
    )
    .with_snapshots(&writer)
    .run(&articles, cancel_rx)
    .await
    .context("Batch processing aborted")?;

    let stats = &outcome.stats;
    println!("\nProcessing Summary");
    println!("==================");
    println!("Total articles:   {}", stats.total);
    println!("From cache:       {}", stats.reused);
    println!("Newly processed:  {}", stats.newly_processed);
    println!("Safety blocked:   {}", stats.safety_blocked);
    println!("Skipped (short):  {}", stats.skipped_short);
    println!("Failed:           {}", stats.failed);
    if stats.duplicates > 0 {
        println!("Duplicates:       {}", stats.duplicates);
    }
    if outcome.interrupted {
        println!("Interrupted; rerun to continue from the cache.");
    }

    if outcome.records.is_empty() {
        tracing::info!(total = 0, valid = 0, "No articles processed, no report written");
        println!("\nNo articles processed (0 total, 0 valid); no report written.");
        return Ok(());
    }

    let report = Report::build(&outcome.records);
    let paths = writer
        .write_final(&report)
        .context("Failed to write reports")?;

    println!("\nReport");
    println!("======");
    println!(
        "Valid: {} / {} (invalid: {})",
        report.summary.valid_articles, report.summary.total_articles, report.summary.invalid_articles
    );
    println!("JSON:     {}", paths.json.display());
    println!("Markdown: {}", paths.markdown.display());
    println!("HTML:     {}", paths.html.display());

    Ok(())
}

/// The configured provider, or the first available one
/// First interrupt cancels the batch; returns true once a second one arrives
async fn forward_interrupts<S, F>(mut next_interrupt: S, cancel: watch::Sender<bool>) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received, finishing current article (interrupt again to abort)");
    let _ = cancel.send(true);

    if next_interrupt().await.is_err() {
        return false;
    }
    tracing::error!("Second interrupt received, aborting");
    true
}

fn select_provider(config: &Config) -> Result<ProviderKind> {
    match config.resolve_provider(config.provider) {
        Some(kind) if kind == config.provider => Ok(kind),
        Some(kind) => {
            tracing::warn!(
                requested = config.provider.as_str(),
                fallback = kind.as_str(),
                "Requested provider has no credentials, falling back"
            );
            Ok(kind)
        }
        None => {
            let vars: Vec<&str> = ProviderKind::ALL
                .iter()
                .flat_map(|kind| kind.credential_vars().iter().copied())
                .collect();
            bail!(
                "No AI provider available; set one of: {}",
                vars.join(", ")
            )
        }
    }
}
