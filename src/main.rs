use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ngdigest::config::{Config, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "ngdigest",
    version,
    about = "Filter, translate and summarize Nigerian news articles with an LLM provider",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process the latest article file and write the reports
    Process {
        /// Provider to use instead of the configured one
        #[arg(short, long)]
        provider: Option<String>,

        /// Article file to process instead of the newest one in the data directory
        #[arg(short, long)]
        articles: Option<PathBuf>,

        /// Directory holding scraped article files
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Root directory for dated report folders
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },

    /// List providers and whether their credentials are configured
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if cli.verbose {
        config.logging.level = String::from("debug");
    }
    config.validate().context("Invalid configuration")?;

    // Initialize tracing/logging
    setup_tracing(&config.logging)?;

    tracing::info!("ngdigest starting");

    match cli.command {
        Commands::Process {
            provider,
            articles,
            data_dir,
            report_dir,
        } => {
            tracing::info!(
                provider = ?provider,
                articles = ?articles,
                "Starting process command"
            );
            commands::process(
                config,
                commands::ProcessArgs {
                    provider,
                    articles,
                    data_dir,
                    report_dir,
                },
            )
            .await?;
        }

        Commands::Providers => commands::providers(&config),
    }

    tracing::info!("ngdigest completed successfully");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::from_env().context("Failed to load config from environment"),
    }
}

fn setup_tracing(logging: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            tracing_subscriber::EnvFilter::try_new(format!("ngdigest={},warn", logging.level))?
        }
    };

    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
