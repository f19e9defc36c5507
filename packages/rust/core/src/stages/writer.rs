//! Writer stage: turn researched articles into drafts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use autopress_shared::{Article, AutopressError, DraftMetadata, Finding, Result, WriterConfig};
use autopress_storage::DRAFTS;
use autopress_text::shingle_overlap;

use crate::agent::{Agent, AgentContext, process_each};
use crate::llm::LlmClient;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Produces draft text and rewrites it for a style and a tone.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Recorded as `metadata.generator` on each draft.
    fn name(&self) -> &str;

    async fn generate(&self, topic: &str, findings: &[Finding]) -> Result<String>;

    async fn apply_style(&self, content: &str, style: &str) -> Result<String>;

    async fn apply_tone(&self, content: &str, tone: &str) -> Result<String>;
}

/// Deterministic Markdown drafts built from the findings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

/// Index just past the title line, or 0 if the draft has none.
fn after_title(content: &str) -> usize {
    if content.starts_with("# ") {
        content.find('\n').map(|i| i + 1).unwrap_or(content.len())
    } else {
        0
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate(&self, topic: &str, findings: &[Finding]) -> Result<String> {
        let mut md = format!("# {topic}\n\n");

        if findings.is_empty() {
            md.push_str(&format!(
                "Notes on {topic}. No supporting sources were found for this draft.\n"
            ));
            return Ok(md);
        }

        md.push_str(&format!(
            "Notes on {topic}, drawing on {} source{}.\n",
            findings.len(),
            if findings.len() == 1 { "" } else { "s" }
        ));

        for finding in findings {
            md.push_str(&format!("\n## {}\n\n", finding.title));
            match finding.summary.as_deref() {
                Some(summary) if !summary.trim().is_empty() => {
                    md.push_str(summary.trim());
                    md.push('\n');
                }
                _ => md.push_str("No summary available.\n"),
            }
        }

        let linked: Vec<&Finding> = findings.iter().filter(|f| f.url.is_some()).collect();
        if !linked.is_empty() {
            md.push_str("\n## Sources\n\n");
            for f in linked {
                if let Some(url) = f.url.as_deref() {
                    md.push_str(&format!("- [{}]({url})\n", f.title));
                }
            }
        }

        Ok(md)
    }

    /// `professional` gives the draft an overview and a conclusion section;
    /// other styles leave the structure alone.
    async fn apply_style(&self, content: &str, style: &str) -> Result<String> {
        if !style.eq_ignore_ascii_case("professional") {
            return Ok(content.to_string());
        }

        let split = after_title(content);
        let (title, body) = content.split_at(split);
        let body = body.trim_start_matches('\n');

        let mut styled = String::from(title);
        if !title.is_empty() {
            styled.push('\n');
        }
        if !body.starts_with("## Overview") {
            styled.push_str("## Overview\n\n");
        }
        styled.push_str(body.trim_end());
        styled.push('\n');
        if !content.contains("\n## Conclusion") {
            styled.push_str("\n## Conclusion\n\nThe sources above cover the main points worth knowing.\n");
        }
        Ok(styled)
    }

    /// `neutral` is the identity; any other tone opens with a framing sentence.
    async fn apply_tone(&self, content: &str, tone: &str) -> Result<String> {
        let tone = tone.trim().to_lowercase();
        if tone.is_empty() || tone == "neutral" {
            return Ok(content.to_string());
        }

        let framing = match tone.as_str() {
            "enthusiastic" => "There is a lot to be excited about here.".to_string(),
            "casual" => "Here's a quick rundown.".to_string(),
            other => format!("This piece takes a {other} look at the topic."),
        };

        let split = after_title(content);
        let (title, body) = content.split_at(split);
        let sep = if title.is_empty() { "" } else { "\n" };
        Ok(format!("{title}{sep}{framing}\n\n{}", body.trim_start_matches('\n')))
    }
}

/// Chat-completion drafts.
#[derive(Debug, Clone)]
pub struct LlmGenerator {
    client: LlmClient,
}

impl LlmGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

const WRITER_SYSTEM_PROMPT: &str =
    "You are a technical writer. Reply with Markdown only, starting with a level-one heading.";

#[async_trait]
impl ContentGenerator for LlmGenerator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(&self, topic: &str, findings: &[Finding]) -> Result<String> {
        let sources = serde_json::to_string_pretty(findings)
            .map_err(|e| AutopressError::Generation(format!("cannot encode findings: {e}")))?;
        let prompt = format!(
            "Write a blog article titled \"{topic}\" using these research findings:\n\n{sources}"
        );
        self.client.complete(WRITER_SYSTEM_PROMPT, &prompt).await
    }

    async fn apply_style(&self, content: &str, style: &str) -> Result<String> {
        let prompt = format!("Rewrite this article in a {style} style. Keep every fact.\n\n{content}");
        self.client.complete(WRITER_SYSTEM_PROMPT, &prompt).await
    }

    async fn apply_tone(&self, content: &str, tone: &str) -> Result<String> {
        let prompt = format!("Adjust the tone of this article to be {tone}. Keep the structure.\n\n{content}");
        self.client.complete(WRITER_SYSTEM_PROMPT, &prompt).await
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

pub struct WriterAgent {
    config: WriterConfig,
    generator: Arc<dyn ContentGenerator>,
    ctx: AgentContext,
}

impl WriterAgent {
    pub fn new(config: WriterConfig, generator: Arc<dyn ContentGenerator>, ctx: AgentContext) -> Self {
        Self {
            config,
            generator,
            ctx,
        }
    }

    async fn draft(&self, mut article: Article) -> Result<Option<Article>> {
        let findings = article.research_data.as_deref().ok_or_else(|| {
            AutopressError::validation(format!("{} has no research data", article.title))
        })?;

        let generated = self.generator.generate(&article.title, findings).await?;
        let styled = self.generator.apply_style(&generated, &self.config.style).await?;
        let toned = self.generator.apply_tone(&styled, &self.config.tone).await?;

        // Largest share taken from any single source; a draft that quotes
        // several sources in turn is a compilation, not a copy.
        let overlap = findings
            .iter()
            .filter_map(|f| f.summary.as_deref())
            .map(|summary| shingle_overlap(&toned, &[summary], self.config.shingle_size))
            .fold(0.0, f64::max);
        if overlap > self.config.max_overlap {
            warn!(
                title = %article.title,
                overlap,
                max = self.config.max_overlap,
                "draft copies too much of its sources, dropping"
            );
            return Ok(None);
        }

        article.content = Some(toned);
        article.metadata = Some(DraftMetadata {
            style: self.config.style.clone(),
            tone: self.config.tone.clone(),
            generator: self.generator.name().to_string(),
            generated_at: Utc::now(),
            overlap,
        });

        self.ctx.persist(&article, DRAFTS)?;
        info!(title = %article.title, "drafted");
        Ok(Some(article))
    }
}

#[async_trait]
impl Agent for WriterAgent {
    type Input = Vec<Article>;
    type Output = Vec<Article>;

    fn name(&self) -> &'static str {
        "WriterAgent"
    }

    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    #[instrument(skip_all, fields(count = input.len(), generator = self.generator.name()))]
    async fn process(&self, input: Vec<Article>) -> Result<Vec<Article>> {
        self.ctx.store.ensure_subdir(DRAFTS)?;
        let outcome = process_each(self.name(), input, |article| self.draft(article)).await;
        info!(
            drafted = outcome.items.len(),
            filtered = outcome.filtered,
            failed = outcome.failed.len(),
            "writing complete"
        );
        Ok(outcome.items)
    }
}
