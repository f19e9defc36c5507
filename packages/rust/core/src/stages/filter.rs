//! Filter stage: word-count floor, spam check, relevance threshold.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use autopress_shared::{Article, FilterConfig, Result};
use autopress_storage::FILTERED_CONTENT;
use autopress_text::{calculate_relevance, link_density, shouting_ratio, word_count};

use crate::agent::{Agent, AgentContext, process_each};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Scores how relevant an article is, in `[0, 1]`.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, article: &Article) -> Result<f64>;
}

#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn is_spam(&self, article: &Article) -> Result<bool>;
}

/// Share of configured keywords found in the title and body.
#[derive(Debug, Clone, Default)]
pub struct KeywordRelevance {
    keywords: Vec<String>,
}

impl KeywordRelevance {
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

#[async_trait]
impl RelevanceScorer for KeywordRelevance {
    async fn score(&self, article: &Article) -> Result<f64> {
        let text = format!("{} {}", article.title, article.content_or_empty());
        Ok(calculate_relevance(&text, &self.keywords))
    }
}

/// Flags phrase matches, link farms, and all-caps shouting.
#[derive(Debug, Clone)]
pub struct HeuristicSpamClassifier {
    phrases: Vec<String>,
    max_link_density: f64,
}

impl HeuristicSpamClassifier {
    pub fn new(phrases: Vec<String>, max_link_density: f64) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
            max_link_density,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.spam_phrases.clone(), config.max_link_density)
    }
}

#[async_trait]
impl SpamClassifier for HeuristicSpamClassifier {
    async fn is_spam(&self, article: &Article) -> Result<bool> {
        let body = article.content_or_empty();
        let lowered = format!("{} {}", article.title, body).to_lowercase();

        if let Some(phrase) = self.phrases.iter().find(|p| lowered.contains(p.as_str())) {
            info!(title = %article.title, %phrase, "spam phrase");
            return Ok(true);
        }

        let density = link_density(body);
        if density > self.max_link_density {
            info!(title = %article.title, density, "link density too high");
            return Ok(true);
        }

        if shouting_ratio(body) > 0.5 {
            info!(title = %article.title, "mostly capitals");
            return Ok(true);
        }

        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct FilterAgent {
    config: FilterConfig,
    scorer: Arc<dyn RelevanceScorer>,
    spam: Arc<dyn SpamClassifier>,
    ctx: AgentContext,
}

impl FilterAgent {
    pub fn new(
        config: FilterConfig,
        scorer: Arc<dyn RelevanceScorer>,
        spam: Arc<dyn SpamClassifier>,
        ctx: AgentContext,
    ) -> Self {
        Self {
            config,
            scorer,
            spam,
            ctx,
        }
    }

    async fn check(&self, article: Article) -> Result<Option<Article>> {
        let words = word_count(article.content_or_empty());
        if words < self.config.min_word_count {
            info!(title = %article.title, words, min = self.config.min_word_count, "too short");
            return Ok(None);
        }

        if self.spam.is_spam(&article).await? {
            info!(title = %article.title, "spam");
            return Ok(None);
        }

        let score = self.scorer.score(&article).await?;
        if score < self.config.min_relevance_score {
            info!(title = %article.title, score, min = self.config.min_relevance_score, "not relevant");
            return Ok(None);
        }

        self.ctx.persist(&article, FILTERED_CONTENT)?;
        Ok(Some(article))
    }
}

#[async_trait]
impl Agent for FilterAgent {
    type Input = Vec<Article>;
    type Output = Vec<Article>;

    fn name(&self) -> &'static str {
        "FilterAgent"
    }

    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    #[instrument(skip_all, fields(count = input.len()))]
    async fn process(&self, input: Vec<Article>) -> Result<Vec<Article>> {
        self.ctx.store.ensure_subdir(FILTERED_CONTENT)?;
        let outcome = process_each(self.name(), input, |article| self.check(article)).await;
        info!(
            passed = outcome.items.len(),
            filtered = outcome.filtered,
            failed = outcome.failed.len(),
            "filter complete"
        );
        Ok(outcome.items)
    }
}
