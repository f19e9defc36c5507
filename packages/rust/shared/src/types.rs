//! Core record types that flow through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Titled
// ---------------------------------------------------------------------------

/// Anything identified by a human-readable title.
///
/// The title is what stages log when an item fails and what the JSON store
/// slugs into a filename.
pub trait Titled {
    fn title(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// An article record as it moves from scrape to publish.
///
/// Stages fill fields progressively: sources set `content`, `url`, `tags`;
/// research sets `research_data`; the writer replaces `content` and sets
/// `metadata`. Unknown fields survive a save/load cycle through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Display title, also the persistence key after slugging.
    #[serde(default)]
    pub title: String,
    /// Article body (Markdown).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Canonical URL of the original article.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Source name the article was scraped from (e.g. `dev.to`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Findings attached by the research stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_data: Option<Vec<Finding>>,
    /// Draft metadata attached by the writer stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DraftMetadata>,
    /// Any other fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Article {
    /// Create an article with just a title and body.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// The body, or an empty string if none has been set yet.
    pub fn content_or_empty(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

impl Titled for Article {
    fn title(&self) -> &str {
        &self.title
    }
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

/// A single supplementary finding returned by a research provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Provider-assigned relevance in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The record persisted under `research/` for each researched article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    /// The article title the findings were looked up for.
    pub topic: String,
    pub research: Vec<Finding>,
}

impl Titled for ResearchRecord {
    fn title(&self) -> &str {
        &self.topic
    }
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// Metadata the writer stage records on each draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMetadata {
    pub style: String,
    pub tone: String,
    /// Name of the content generator that produced the draft.
    pub generator: String,
    pub generated_at: DateTime<Utc>,
    /// Share of the draft's word shingles found in the research summaries.
    #[serde(default)]
    pub overlap: f64,
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Outcome status of a publish submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Accepted by the target as an unpublished draft.
    Draft,
    /// Publicly visible on the target.
    Published,
    /// Not submitted anywhere; no publishing target configured.
    DryRun,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::DryRun => "dry_run",
        }
    }
}

/// What the publish stage emits for every submitted article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    pub title: String,
    pub tags: Vec<String>,
    pub status: PublishStatus,
    /// Identifier assigned by the publishing target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Public or draft URL on the publishing target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// URL of the article the draft was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Titled for PublishResult {
    fn title(&self) -> &str {
        &self.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_keeps_unknown_fields() {
        let json = r#"{
            "title": "Async Rust in Practice",
            "content": "body",
            "reading_time_minutes": 7,
            "tags": ["rust"]
        }"#;
        let article: Article = serde_json::from_str(json).expect("deserialize");
        assert_eq!(article.title, "Async Rust in Practice");
        assert_eq!(article.extra["reading_time_minutes"], 7);

        let back = serde_json::to_value(&article).expect("serialize");
        assert_eq!(back["reading_time_minutes"], 7);
        assert!(back.get("research_data").is_none());
    }

    #[test]
    fn article_without_title_deserializes_empty() {
        let article: Article = serde_json::from_str(r#"{"content": "x"}"#).expect("deserialize");
        assert!(article.title.is_empty());
        assert_eq!(article.content_or_empty(), "x");
    }

    #[test]
    fn publish_status_serializes_snake_case() {
        let json = serde_json::to_string(&PublishStatus::DryRun).expect("serialize");
        assert_eq!(json, "\"dry_run\"");
        assert_eq!(PublishStatus::Draft.as_str(), "draft");
    }
}
