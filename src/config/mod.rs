//! Configuration management for ngdigest
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. A `Config` is built once at startup and passed by
//! reference; provider availability is queried from it rather than assumed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::is_blank;

/// The closed set of supported text-generation providers
///
/// Declaration order is the catalogue order used for availability listings
/// and fallback selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Openai,
    Claude,
    Ollama,
    Tongyi,
    Deepseek,
    Hunyuan,
    Zhipu,
}

impl ProviderKind {
    /// All providers in catalogue order
    pub const ALL: [ProviderKind; 8] = [
        Self::Gemini,
        Self::Openai,
        Self::Claude,
        Self::Ollama,
        Self::Tongyi,
        Self::Deepseek,
        Self::Hunyuan,
        Self::Zhipu,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Openai => "openai",
            Self::Claude => "claude",
            Self::Ollama => "ollama",
            Self::Tongyi => "tongyi",
            Self::Deepseek => "deepseek",
            Self::Hunyuan => "hunyuan",
            Self::Zhipu => "zhipu",
        }
    }

    /// Human-readable provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Google Gemini",
            Self::Openai => "OpenAI GPT",
            Self::Claude => "Anthropic Claude",
            Self::Ollama => "Ollama (本地)",
            Self::Tongyi => "阿里云通义千问",
            Self::Deepseek => "DeepSeek",
            Self::Hunyuan => "腾讯混元",
            Self::Zhipu => "智谱AI (GLM)",
        }
    }

    /// Environment variables holding this provider's credentials
    pub fn credential_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &["GEMINI_API_KEY"],
            Self::Openai => &["OPENAI_API_KEY"],
            Self::Claude => &["ANTHROPIC_API_KEY"],
            Self::Ollama => &[],
            Self::Tongyi => &["DASHSCOPE_API_KEY"],
            Self::Deepseek => &["DEEPSEEK_API_KEY"],
            Self::Hunyuan => &["TENCENT_SECRET_ID", "TENCENT_SECRET_KEY"],
            Self::Zhipu => &["ZHIPU_API_KEY"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| Error::UnknownProvider(s.trim().to_string()))
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Selected provider
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    /// Per-provider settings, keyed by provider name
    #[serde(default)]
    pub providers: BTreeMap<ProviderKind, ProviderConfig>,

    /// Batch processing settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Prompt template source
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for one provider, immutable once loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key, or the secret id for Hunyuan
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Secondary secret (Hunyuan only)
    #[serde(default, skip_serializing)]
    pub secret_key: Option<String>,

    /// Base endpoint URL
    pub base_url: String,

    /// Candidate model identifiers, in preference order
    #[serde(default)]
    pub models: Vec<String>,

    /// Model used by providers that do not probe candidates
    pub default_model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum output tokens
    pub max_tokens: u32,

    /// Cloud region (Hunyuan only)
    #[serde(default)]
    pub region: Option<String>,

    /// Deep-reasoning mode toggle (Zhipu only)
    #[serde(default)]
    pub thinking: bool,
}

impl ProviderConfig {
    /// Built-in settings for a provider, without credentials
    pub fn defaults(kind: ProviderKind) -> Self {
        let (base_url, models, default_model, temperature, max_tokens): (
            &str,
            &[&str],
            &str,
            f32,
            u32,
        ) = match kind {
            ProviderKind::Gemini => (
                "https://generativelanguage.googleapis.com",
                &["gemini-3-flash-preview"],
                "gemini-1.5-pro",
                0.7,
                8192,
            ),
            ProviderKind::Openai => (
                "https://api.openai.com/v1",
                &["gpt-4-turbo-preview", "gpt-4", "gpt-3.5-turbo"],
                "gpt-4-turbo-preview",
                0.7,
                4096,
            ),
            ProviderKind::Claude => (
                "https://api.anthropic.com",
                &[
                    "claude-3-opus-20240229",
                    "claude-3-sonnet-20240229",
                    "claude-3-haiku-20240307",
                ],
                "claude-3-sonnet-20240229",
                0.7,
                4096,
            ),
            ProviderKind::Ollama => (
                "http://localhost:11434",
                &["llama2", "mistral", "codellama", "llama2:13b"],
                "llama2",
                0.7,
                4096,
            ),
            ProviderKind::Tongyi => (
                "https://dashscope.aliyuncs.com",
                &["qwen-plus", "qwen-turbo", "qwen-plus-longcontext"],
                "qwen-max",
                0.7,
                2000,
            ),
            ProviderKind::Deepseek => (
                "https://api.deepseek.com",
                &["deepseek-chat", "deepseek-reasoner"],
                "deepseek-chat",
                0.7,
                4096,
            ),
            ProviderKind::Hunyuan => (
                "https://hunyuan.tencentcloudapi.com",
                &["hunyuan-lite", "hunyuan-standard", "hunyuan-pro"],
                "hunyuan-lite",
                0.7,
                4096,
            ),
            ProviderKind::Zhipu => (
                "https://open.bigmodel.cn/api/paas/v4",
                &["glm-4.7", "glm-4", "glm-4-flash", "glm-3-turbo"],
                "glm-4.7",
                1.0,
                65536,
            ),
        };

        Self {
            api_key: None,
            secret_key: None,
            base_url: base_url.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            default_model: default_model.to_string(),
            temperature,
            max_tokens,
            region: (kind == ProviderKind::Hunyuan).then(|| "ap-beijing".to_string()),
            thinking: false,
        }
    }

    /// Candidate models followed by the default model, without duplicates
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.models.len() + 1);
        for model in self.models.iter().chain(std::iter::once(&self.default_model)) {
            if !model.is_empty() && !out.contains(model) {
                out.push(model.clone());
            }
        }
        out
    }
}

/// Batch processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Characters of maintext passed to the prompt
    pub maintext_limit: usize,

    /// Articles with shorter maintext are skipped
    pub min_maintext_chars: usize,

    /// Intermediate report every N newly processed articles
    pub save_interval: usize,

    /// Delay after each provider call, in milliseconds
    pub request_delay_ms: u64,

    /// Per-call timeout in seconds
    pub request_timeout_secs: u64,

    /// Retries on recoverable call errors (0 = single attempt)
    pub max_retries: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            maintext_limit: 3000,
            min_maintext_chars: 100,
            save_interval: 5,
            request_delay_ms: 1000,
            request_timeout_secs: 120,
            max_retries: 0,
        }
    }
}

impl BatchConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Get inter-call delay as Duration
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding scraped article files
    pub data_dir: PathBuf,

    /// Root directory for dated report folders
    pub report_dir: PathBuf,

    /// Explicit article file, bypassing latest-file discovery
    pub articles_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            report_dir: PathBuf::from("report"),
            articles_file: None,
        }
    }
}

/// Prompt template source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Inline template, takes precedence over the file
    pub template: Option<String>,

    /// Template file, used when no inline template is set
    pub template_file: PathBuf,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: None,
            template_file: PathBuf::from("prompt_template.txt"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Gemini
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = match get("AI_PROVIDER") {
            Some(name) => name.parse()?,
            None => default_provider(),
        };

        let mut providers = BTreeMap::new();
        for kind in ProviderKind::ALL {
            let mut pc = ProviderConfig::defaults(kind);
            let vars = kind.credential_vars();
            pc.api_key = vars.first().and_then(|v| get(v));
            pc.secret_key = vars.get(1).and_then(|v| get(v));
            match kind {
                ProviderKind::Ollama => {
                    if let Some(url) = get("OLLAMA_BASE_URL") {
                        pc.base_url = url;
                    }
                }
                ProviderKind::Hunyuan => {
                    if let Some(region) = get("TENCENT_REGION") {
                        pc.region = Some(region);
                    }
                }
                ProviderKind::Zhipu => {
                    pc.thinking = get("ZHIPU_THINKING").is_some_and(|v| parse_flag(&v));
                }
                _ => {}
            }
            providers.insert(kind, pc);
        }

        let defaults = BatchConfig::default();
        let batch = BatchConfig {
            request_timeout_secs: parse_var(
                &get,
                "NGDIGEST_REQUEST_TIMEOUT",
                defaults.request_timeout_secs,
            )?,
            request_delay_ms: parse_var(&get, "NGDIGEST_REQUEST_DELAY_MS", defaults.request_delay_ms)?,
            max_retries: parse_var(&get, "NGDIGEST_MAX_RETRIES", defaults.max_retries)?,
            ..defaults
        };

        let mut paths = PathsConfig::default();
        if let Some(dir) = get("NGDIGEST_DATA_DIR") {
            paths.data_dir = dir.into();
        }
        if let Some(dir) = get("NGDIGEST_REPORT_DIR") {
            paths.report_dir = dir.into();
        }
        paths.articles_file = get("ARTICLES_FILE").map(PathBuf::from);

        let mut prompt = PromptConfig {
            template: get("PROMPT_TEMPLATE"),
            ..PromptConfig::default()
        };
        if let Some(file) = get("PROMPT_TEMPLATE_FILE") {
            prompt.template_file = file.into();
        }

        let logging = LoggingConfig {
            level: get("NGDIGEST_LOG_LEVEL").unwrap_or_else(|| String::from("info")),
            format: get("NGDIGEST_LOG_FORMAT").unwrap_or_else(|| String::from("text")),
        };

        Ok(Self {
            provider,
            providers,
            batch,
            paths,
            prompt,
            logging,
        })
    }

    /// Load configuration from a TOML file
    ///
    /// Providers missing from the file get their built-in settings.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let mut config: Self = toml::from_str(&content).map_err(|e| {
            Error::config(format!("Failed to parse TOML config file {}: {e}", path.display()))
        })?;

        for kind in ProviderKind::ALL {
            config
                .providers
                .entry(kind)
                .or_insert_with(|| ProviderConfig::defaults(kind));
        }

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.batch.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be greater than 0"));
        }

        if self.batch.save_interval == 0 {
            return Err(Error::config("save_interval must be greater than 0"));
        }

        if self.batch.maintext_limit == 0 {
            return Err(Error::config("maintext_limit must be greater than 0"));
        }

        for (kind, pc) in &self.providers {
            if !(0.0..=2.0).contains(&pc.temperature) {
                return Err(Error::config(format!(
                    "{kind}: temperature {} outside [0, 2]",
                    pc.temperature
                )));
            }
            if pc.max_tokens == 0 {
                return Err(Error::config(format!("{kind}: max_tokens must be greater than 0")));
            }
            if pc.candidates().is_empty() {
                return Err(Error::config(format!("{kind}: no model configured")));
            }
            if url::Url::parse(&pc.base_url).is_err() {
                return Err(Error::config(format!("{kind}: invalid base_url {}", pc.base_url)));
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(Error::config(format!(
                "log format must be text or json, got {}",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Settings for a provider
    pub fn provider_config(&self, kind: ProviderKind) -> Result<&ProviderConfig> {
        self.providers
            .get(&kind)
            .ok_or_else(|| Error::config(format!("no settings for provider {kind}")))
    }

    /// Whether a provider has the credentials it needs
    pub fn is_available(&self, kind: ProviderKind) -> bool {
        let Some(pc) = self.providers.get(&kind) else {
            return false;
        };
        match kind {
            ProviderKind::Ollama => true,
            ProviderKind::Hunyuan => {
                !is_blank(pc.api_key.as_deref()) && !is_blank(pc.secret_key.as_deref())
            }
            _ => !is_blank(pc.api_key.as_deref()),
        }
    }

    /// Available providers in catalogue order
    pub fn available_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }

    /// The requested provider if usable, otherwise the first available one
    pub fn resolve_provider(&self, requested: ProviderKind) -> Option<ProviderKind> {
        if self.is_available(requested) {
            Some(requested)
        } else {
            self.available_providers().into_iter().next()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            providers: ProviderKind::ALL
                .into_iter()
                .map(|kind| (kind, ProviderConfig::defaults(kind)))
                .collect(),
            batch: BatchConfig::default(),
            paths: PathsConfig::default(),
            prompt: PromptConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn parse_var<T, G>(get: &G, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{name}: cannot parse {raw:?}"))),
        None => Ok(default),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
