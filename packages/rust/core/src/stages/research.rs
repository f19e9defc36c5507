//! Research stage: attach supporting findings to each article.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use autopress_shared::{Article, AutopressError, Finding, ResearchConfig, ResearchRecord, Result};
use autopress_storage::{JsonStore, RAW_CONTENT, RESEARCH, slugify_title};
use autopress_text::{calculate_relevance, extract_keywords};

use crate::agent::{Agent, AgentContext, process_each};
use crate::llm::{LlmClient, strip_code_fence};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Looks up findings related to a topic.
#[async_trait]
pub trait ResearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn research(&self, topic: &str) -> Result<Vec<Finding>>;
}

/// Offline provider: ranks previously scraped articles by keyword overlap.
#[derive(Debug, Clone)]
pub struct ArchiveResearch {
    store: JsonStore,
}

impl ArchiveResearch {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }
}

/// First `n` words of `text`, with an ellipsis if cut.
fn excerpt(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= n {
        words.join(" ")
    } else {
        format!("{}…", words[..n].join(" "))
    }
}

#[async_trait]
impl ResearchProvider for ArchiveResearch {
    fn name(&self) -> &str {
        "archive"
    }

    async fn research(&self, topic: &str) -> Result<Vec<Finding>> {
        let keywords = extract_keywords(topic, 16);
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let own = slugify_title(topic);
        let archive: Vec<(String, Article)> = self.store.list_data(RAW_CONTENT)?;

        let mut ranked: Vec<(f64, Article)> = archive
            .into_iter()
            .filter(|(name, _)| *name != own)
            .filter_map(|(_, article)| {
                let text = format!("{} {}", article.title, article.content_or_empty());
                let score = calculate_relevance(&text, &keywords);
                (score > 0.0).then_some((score, article))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        debug!(topic, candidates = ranked.len(), "archive research");

        Ok(ranked
            .into_iter()
            .map(|(score, article)| Finding {
                summary: article.content.as_deref().map(|c| excerpt(c, 40)),
                title: article.title,
                url: article.url,
                relevance: Some(score),
                ..Finding::default()
            })
            .collect())
    }
}

/// Asks a chat-completion model for findings as a JSON array.
#[derive(Debug, Clone)]
pub struct LlmResearch {
    client: LlmClient,
    depth: String,
    max_sources: usize,
}

impl LlmResearch {
    pub fn new(client: LlmClient, depth: impl Into<String>, max_sources: usize) -> Self {
        Self {
            client,
            depth: depth.into(),
            max_sources,
        }
    }
}

const RESEARCH_SYSTEM_PROMPT: &str = "You are a research assistant for a technical blog. \
Reply with a JSON array only. Each element has the keys \"title\", \"url\", \"summary\" \
and \"relevance\" (a number between 0 and 1).";

#[async_trait]
impl ResearchProvider for LlmResearch {
    fn name(&self) -> &str {
        "llm"
    }

    async fn research(&self, topic: &str) -> Result<Vec<Finding>> {
        let prompt = format!(
            "Find up to {} sources about \"{topic}\". Research depth: {}.",
            self.max_sources, self.depth
        );
        let reply = self.client.complete(RESEARCH_SYSTEM_PROMPT, &prompt).await?;

        serde_json::from_str(strip_code_fence(&reply))
            .map_err(|e| AutopressError::parse(format!("research reply is not a findings array: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A finding is usable if it has no URL or an absolute http(s) one.
fn has_valid_source(finding: &Finding) -> bool {
    match finding.url.as_deref() {
        None => true,
        Some(raw) => Url::parse(raw)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
            .unwrap_or(false),
    }
}

pub struct ResearchAgent {
    config: ResearchConfig,
    provider: Arc<dyn ResearchProvider>,
    ctx: AgentContext,
}

impl ResearchAgent {
    pub fn new(config: ResearchConfig, provider: Arc<dyn ResearchProvider>, ctx: AgentContext) -> Self {
        Self {
            config,
            provider,
            ctx,
        }
    }

    async fn enrich(&self, mut article: Article) -> Result<Option<Article>> {
        let found = self.provider.research(&article.title).await?;

        let findings: Vec<Finding> = found
            .into_iter()
            .filter(|f| {
                let ok = has_valid_source(f);
                if !ok {
                    warn!(topic = %article.title, finding = %f.title, url = ?f.url, "dropping finding with invalid source");
                }
                ok
            })
            .take(self.config.max_sources)
            .collect();

        let record = ResearchRecord {
            topic: article.title.clone(),
            research: findings.clone(),
        };
        self.ctx.persist(&record, RESEARCH)?;

        info!(title = %article.title, findings = findings.len(), "researched");
        article.research_data = Some(findings);
        Ok(Some(article))
    }
}

#[async_trait]
impl Agent for ResearchAgent {
    type Input = Vec<Article>;
    type Output = Vec<Article>;

    fn name(&self) -> &'static str {
        "ResearchAgent"
    }

    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    #[instrument(skip_all, fields(count = input.len(), provider = self.provider.name()))]
    async fn process(&self, input: Vec<Article>) -> Result<Vec<Article>> {
        self.ctx.store.ensure_subdir(RESEARCH)?;
        let outcome = process_each(self.name(), input, |article| self.enrich(article)).await;
        Ok(outcome.items)
    }
}
