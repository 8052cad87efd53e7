//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use ngdigest::config::{ProviderConfig, ProviderKind};
use ngdigest::llm::{GenerationRequest, GenerationResult, TextGenerator};
use ngdigest::models::Article;
use ngdigest::processing::BatchSettings;

/// Body long enough to pass the short-maintext filter
pub const LONG_BODY: &str = "The Federal Government on Tuesday presented the 2025 \
    appropriation bill to the National Assembly in Abuja, citing revenue growth \
    and new capital projects across the six geopolitical zones.";

/// Create a test article with default values
pub fn create_test_article() -> Article {
    create_article("https://punchng.com/budget-2025", "Tinubu presents 2025 budget")
}

/// Create article with specific url/title
pub fn create_article(url: &str, title: &str) -> Article {
    Article {
        title: title.to_string(),
        description: "Budget presentation at the National Assembly".to_string(),
        maintext: LONG_BODY.to_string(),
        authors: vec!["Adaeze Okafor".to_string()],
        date_publish: "2025-01-20 08:00:00".to_string(),
        source_domain: "punchng.com".to_string(),
        url: url.to_string(),
        homepage_source: "https://punchng.com".to_string(),
    }
}

/// `n` distinct articles
pub fn create_articles(n: usize) -> Vec<Article> {
    (1..=n)
        .map(|i| create_article(&format!("https://punchng.com/story-{i}"), &format!("Story {i}")))
        .collect()
}

/// Model reply for a valid article, wrapped in a json fence
pub fn valid_reply(category: &str) -> String {
    format!(
        "Here is the analysis:\n```json\n{{\"is_valid\": true, \"category\": \"{category}\", \
         \"key_points\": [\"预算提交国会\"], \"title_zh\": \"提努布提交2025年预算\", \
         \"description_zh\": \"预算案\", \"summary_zh\": \"联邦政府提交预算。\", \
         \"maintext_zh\": \"联邦政府周二向国民议会提交了2025年拨款法案。\"}}\n```"
    )
}

/// Batch settings without the inter-call delay
pub fn fast_settings() -> BatchSettings {
    BatchSettings {
        request_delay: Duration::ZERO,
        ..BatchSettings::default()
    }
}

/// Provider settings pointed at a mock server
pub fn provider_config(kind: ProviderKind, base_url: &str) -> ProviderConfig {
    let mut config = ProviderConfig::defaults(kind);
    config.base_url = base_url.to_string();
    config.api_key = Some("test-key".to_string());
    if kind == ProviderKind::Hunyuan {
        config.secret_key = Some("test-secret".to_string());
    }
    config
}

type Reply = Box<dyn Fn(&str) -> GenerationResult + Send + Sync>;

/// In-process generator answering from a closure
pub struct ScriptedGenerator {
    reply: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    cancel_after: Option<(usize, watch::Sender<bool>)>,
}

impl ScriptedGenerator {
    pub fn new(reply: impl Fn(&str) -> GenerationResult + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            cancel_after: None,
        }
    }

    /// Always answers with a valid record in `category`
    pub fn valid(category: &str) -> Self {
        let reply = valid_reply(category);
        Self::new(move |_| GenerationResult::completed(reply.clone(), Some("stop".into())))
    }

    /// Flip `cancel` to true once `calls` calls have been answered
    pub fn cancel_after(mut self, calls: usize, cancel: watch::Sender<bool>) -> Self {
        self.cancel_after = Some((calls, cancel));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Zhipu
    }

    fn model(&self) -> &str {
        "glm-4.7"
    }

    async fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let result = (self.reply)(&request.prompt);
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, cancel)) = &self.cancel_after {
            if calls >= *limit {
                let _ = cancel.send(true);
            }
        }
        result
    }
}

/// A cancellation channel that never fires
pub fn no_cancel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
