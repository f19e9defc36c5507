//! Publish stage: validate drafts and submit them to the publishing target.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use autopress_shared::{
    Article, AutopressError, DevToPublishConfig, MediumPublishConfig, PublishResult, PublishStatus,
    PublisherConfig, Result,
};
use autopress_storage::PUBLISHED;

use crate::agent::{Agent, AgentContext, process_each};

/// Most tags Dev.to accepts on one article.
pub const MAX_TAGS: usize = 4;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// A validated submission.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Requested status: `draft`, `public` or `published`.
    pub status: String,
    pub source_url: Option<String>,
}

impl PublishRequest {
    /// Whether the requested status asks for a public post.
    pub fn wants_public(&self) -> bool {
        matches!(self.status.to_lowercase().as_str(), "public" | "published")
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult>;
}

/// Records what would have been published without contacting anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPublisher;

#[async_trait]
impl Publisher for DryRunPublisher {
    fn name(&self) -> &str {
        "dry_run"
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult> {
        let mut extra = Map::new();
        extra.insert("requested_status".into(), Value::String(request.status.clone()));
        Ok(PublishResult {
            title: request.title.clone(),
            tags: request.tags.clone(),
            status: PublishStatus::DryRun,
            id: Some(Uuid::now_v7().to_string()),
            url: None,
            source_url: request.source_url.clone(),
            published_at: Utc::now(),
            extra,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DevToCreated {
    id: u64,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published: Option<bool>,
}

/// Posts articles through the Forem API.
#[derive(Debug, Clone)]
pub struct DevToPublisher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl DevToPublisher {
    pub fn new(client: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Build from the `publisher.devto` block. Fails without an API key.
    pub fn from_config(config: &DevToPublishConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AutopressError::config("publisher.devto.api_key is required for target devto"))?;
        let client = autopress_sources::build_client()?;
        Ok(Self::new(client, &config.base_url, api_key))
    }
}

#[async_trait]
impl Publisher for DevToPublisher {
    fn name(&self) -> &str {
        "devto"
    }

    #[instrument(skip_all, fields(title = %request.title))]
    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult> {
        let url = format!("{}/api/articles", self.base_url);
        let mut article = json!({
            "title": request.title,
            "body_markdown": request.content,
            "published": request.wants_public(),
            "tags": request.tags,
        });
        if let Some(source) = &request.source_url {
            article["canonical_url"] = Value::String(source.clone());
        }

        debug!(%url, "submitting article");
        let response = self
            .client
            .post(&url)
            .header("api-key", &self.api_key)
            .json(&json!({ "article": article }))
            .send()
            .await
            .map_err(|e| AutopressError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AutopressError::Publish(format!("dev.to rejected article ({status}): {body}")));
        }

        let created: DevToCreated = response
            .json()
            .await
            .map_err(|e| AutopressError::parse(format!("dev.to response: {e}")))?;

        let published = created.published.unwrap_or_else(|| request.wants_public());
        Ok(PublishResult {
            title: request.title.clone(),
            tags: request.tags.clone(),
            status: if published {
                PublishStatus::Published
            } else {
                PublishStatus::Draft
            },
            id: Some(created.id.to_string()),
            url: created.url,
            source_url: request.source_url.clone(),
            published_at: Utc::now(),
            extra: Map::new(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MediumEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct MediumUser {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediumPost {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    publish_status: Option<String>,
}

/// Posts articles through the Medium API as the token's owner, or as a
/// configured author.
#[derive(Debug, Clone)]
pub struct MediumPublisher {
    client: Client,
    base_url: String,
    token: String,
    author_id: Option<String>,
}

impl MediumPublisher {
    pub fn new(client: Client, base_url: &str, token: &str, author_id: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            author_id: author_id.filter(|id| !id.is_empty()),
        }
    }

    /// Build from the `publisher.medium` block. Fails without an API key.
    pub fn from_config(config: &MediumPublishConfig) -> Result<Self> {
        let token = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AutopressError::config("publisher.medium.api_key is required for target medium"))?;
        let client = autopress_sources::build_client()?;
        Ok(Self::new(client, &config.base_url, token, config.author_id.clone()))
    }

    async fn author_id(&self) -> Result<String> {
        if let Some(id) = &self.author_id {
            return Ok(id.clone());
        }

        let url = format!("{}/me", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AutopressError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AutopressError::Publish(format!("medium user lookup failed ({status})")));
        }

        let me: MediumEnvelope<MediumUser> = response
            .json()
            .await
            .map_err(|e| AutopressError::parse(format!("medium user response: {e}")))?;
        Ok(me.data.id)
    }
}

#[async_trait]
impl Publisher for MediumPublisher {
    fn name(&self) -> &str {
        "medium"
    }

    #[instrument(skip_all, fields(title = %request.title))]
    async fn publish(&self, request: &PublishRequest) -> Result<PublishResult> {
        let author = self.author_id().await?;
        let url = format!("{}/users/{author}/posts", self.base_url);

        let mut post = json!({
            "title": request.title,
            "contentFormat": "markdown",
            "content": request.content,
            "tags": request.tags,
            "publishStatus": if request.wants_public() { "public" } else { "draft" },
        });
        if let Some(source) = &request.source_url {
            post["canonicalUrl"] = Value::String(source.clone());
        }

        debug!(%url, "submitting post");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&post)
            .send()
            .await
            .map_err(|e| AutopressError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AutopressError::Publish(format!("medium rejected post ({status}): {body}")));
        }

        let created: MediumEnvelope<MediumPost> = response
            .json()
            .await
            .map_err(|e| AutopressError::parse(format!("medium response: {e}")))?;
        let post = created.data;

        let published = match post.publish_status.as_deref() {
            Some(s) => s == "public",
            None => request.wants_public(),
        };
        let mut extra = Map::new();
        extra.insert("author_id".into(), Value::String(author));
        Ok(PublishResult {
            title: request.title.clone(),
            tags: request.tags.clone(),
            status: if published {
                PublishStatus::Published
            } else {
                PublishStatus::Draft
            },
            id: Some(post.id),
            url: post.url,
            source_url: request.source_url.clone(),
            published_at: Utc::now(),
            extra,
        })
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Article tags followed by defaults, lowercased, deduplicated, at most [`MAX_TAGS`].
pub fn merge_tags(own: &[String], defaults: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for tag in own.iter().chain(defaults) {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() || merged.contains(&tag) {
            continue;
        }
        merged.push(tag);
        if merged.len() == MAX_TAGS {
            break;
        }
    }
    merged
}

pub struct PublisherAgent {
    config: PublisherConfig,
    publisher: Arc<dyn Publisher>,
    ctx: AgentContext,
}

impl PublisherAgent {
    pub fn new(config: PublisherConfig, publisher: Arc<dyn Publisher>, ctx: AgentContext) -> Self {
        Self {
            config,
            publisher,
            ctx,
        }
    }

    /// Build a request, or `None` if the article lacks a title, content or tags.
    fn request_for(&self, article: Article) -> Option<PublishRequest> {
        let mut missing = Vec::new();
        if article.title.trim().is_empty() {
            missing.push("title");
        }
        if article.content.is_none() {
            missing.push("content");
        }
        if article.tags.is_none() {
            missing.push("tags");
        }
        if !missing.is_empty() {
            warn!(title = %article.title, missing = %missing.join(", "), "not publishable, skipping");
            return None;
        }

        Some(PublishRequest {
            tags: merge_tags(article.tags.as_deref().unwrap_or_default(), &self.config.tags),
            content: article.content.unwrap_or_default(),
            title: article.title,
            status: self.config.status.clone(),
            source_url: article.url,
        })
    }

    async fn submit(&self, article: Article) -> Result<Option<PublishResult>> {
        let Some(request) = self.request_for(article) else {
            return Ok(None);
        };
        let result = self.publisher.publish(&request).await?;

        self.ctx.persist(&result, PUBLISHED)?;
        info!(title = %result.title, status = result.status.as_str(), id = ?result.id, "published");
        Ok(Some(result))
    }
}

#[async_trait]
impl Agent for PublisherAgent {
    type Input = Vec<Article>;
    type Output = Vec<PublishResult>;

    fn name(&self) -> &'static str {
        "PublisherAgent"
    }

    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    #[instrument(skip_all, fields(count = input.len(), target = self.publisher.name()))]
    async fn process(&self, input: Vec<Article>) -> Result<Vec<PublishResult>> {
        self.ctx.store.ensure_subdir(PUBLISHED)?;
        let outcome = process_each(self.name(), input, |article| self.submit(article)).await;
        info!(
            published = outcome.items.len(),
            skipped = outcome.filtered,
            failed = outcome.failed.len(),
            "publishing complete"
        );
        Ok(outcome.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use autopress_storage::JsonStore;

    use crate::monitoring::Metrics;

    /// Remembers every request it sees.
    #[derive(Default)]
    struct Recording(Mutex<Vec<PublishRequest>>);

    #[async_trait]
    impl Publisher for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&self, request: &PublishRequest) -> Result<PublishResult> {
            self.0.lock().push(request.clone());
            DryRunPublisher.publish(request).await
        }
    }

    fn agent(dir: &tempfile::TempDir, publisher: Arc<dyn Publisher>, tags: &[&str]) -> PublisherAgent {
        let ctx = AgentContext::new(JsonStore::new(dir.path()), Arc::new(Metrics::new()))
            .with_rate_limit(Duration::ZERO);
        let config = PublisherConfig {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..PublisherConfig::default()
        };
        PublisherAgent::new(config, publisher, ctx)
    }

    fn draft(title: &str, tags: Option<&[&str]>) -> Article {
        let mut article = Article::new(title, "# Draft\n\nBody");
        article.tags = tags.map(|t| t.iter().map(|s| s.to_string()).collect());
        article.url = Some("https://dev.to/orig".into());
        article
    }

    #[tokio::test]
    async fn invalid_items_never_reach_publisher() {
        let dir = tempfile::tempdir().unwrap();
        let recording = Arc::new(Recording::default());
        let publisher = agent(&dir, recording.clone(), &[]);

        let mut no_content = draft("No content", Some(&["rust"]));
        no_content.content = None;
        let input = vec![
            draft("Valid", Some(&["rust"])),
            draft("No tags", None),
            no_content,
            draft("", Some(&["rust"])),
        ];

        let out = publisher.execute(input).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "Valid");

        let seen = recording.0.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "Valid");
    }

    /// Fails every submission.
    struct Offline;

    #[async_trait]
    impl Publisher for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn publish(&self, _request: &PublishRequest) -> Result<PublishResult> {
            Err(AutopressError::Network("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn incomplete_drafts_are_skipped_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = agent(&dir, Arc::new(DryRunPublisher), &[]);

        let mut no_content = draft("No content", Some(&["rust"]));
        no_content.content = None;
        let input = vec![
            draft("Valid", Some(&["rust"])),
            draft("No tags", None),
            no_content,
            draft("", Some(&["rust"])),
        ];

        let outcome = process_each("PublisherAgent", input, |a| publisher.submit(a)).await;
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.filtered, 3);
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn target_errors_count_as_failures() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = agent(&dir, Arc::new(Offline), &[]);

        let input = vec![draft("Valid", Some(&["rust"])), draft("No tags", None)];
        let outcome = process_each("PublisherAgent", input, |a| publisher.submit(a)).await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.filtered, 1);
        assert_eq!(outcome.failed, vec!["Valid"]);
    }

    #[tokio::test]
    async fn result_is_persisted_and_carries_identity() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = agent(&dir, Arc::new(DryRunPublisher), &["programming"]);

        let out = publisher
            .execute(vec![draft("Async Rust", Some(&["rust"]))])
            .await
            .unwrap();
        let result = &out[0];
        assert_eq!(result.status, PublishStatus::DryRun);
        assert_eq!(result.tags, vec!["rust", "programming"]);
        assert_eq!(result.source_url.as_deref(), Some("https://dev.to/orig"));
        assert!(result.id.is_some());

        let saved: PublishResult = JsonStore::new(dir.path())
            .load_data("async_rust", PUBLISHED)
            .unwrap();
        assert_eq!(&saved, result);
    }

    #[test]
    fn tags_merge_dedupe_and_cap() {
        let own = vec!["Rust".to_string(), "async".to_string()];
        let defaults = vec![
            "rust".to_string(),
            "programming".to_string(),
            "tutorial".to_string(),
            "beginners".to_string(),
        ];
        assert_eq!(
            merge_tags(&own, &defaults),
            vec!["rust", "async", "programming", "tutorial"]
        );
        assert!(merge_tags(&[], &[]).is_empty());
    }

    #[tokio::test]
    async fn devto_publisher_posts_with_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/articles"))
            .and(header("api-key", "secret"))
            .and(body_partial_json(serde_json::json!({
                "article": { "title": "Async Rust", "published": false, "tags": ["rust"] }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 42,
                "url": "https://dev.to/me/async-rust-temp",
                "published": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = DevToPublisher::new(Client::new(), &server.uri(), "secret");
        let request = PublishRequest {
            title: "Async Rust".into(),
            content: "# Async Rust".into(),
            tags: vec!["rust".into()],
            status: "draft".into(),
            source_url: None,
        };

        let result = publisher.publish(&request).await.unwrap();
        assert_eq!(result.status, PublishStatus::Draft);
        assert_eq!(result.id.as_deref(), Some("42"));
        assert_eq!(result.url.as_deref(), Some("https://dev.to/me/async-rust-temp"));
    }

    #[tokio::test]
    async fn devto_rejection_is_publish_error() {
        let server = MockServer::start().await;
        Mock::given(path("/api/articles"))
            .respond_with(ResponseTemplate::new(422).set_body_string("Title can't be blank"))
            .mount(&server)
            .await;

        let publisher = DevToPublisher::new(Client::new(), &server.uri(), "secret");
        let request = PublishRequest {
            title: "x".into(),
            content: "y".into(),
            tags: vec![],
            status: "public".into(),
            source_url: None,
        };
        let err = publisher.publish(&request).await.unwrap_err();
        assert!(matches!(err, AutopressError::Publish(ref m) if m.contains("422")));
    }

    #[test]
    fn devto_without_key_is_config_error() {
        let err = DevToPublisher::from_config(&DevToPublishConfig::default()).unwrap_err();
        assert!(matches!(err, AutopressError::Config { .. }));
    }

    fn medium_request(status: &str) -> PublishRequest {
        PublishRequest {
            title: "Async Rust".into(),
            content: "# Async Rust".into(),
            tags: vec!["rust".into()],
            status: status.into(),
            source_url: Some("https://dev.to/orig".into()),
        }
    }

    #[tokio::test]
    async fn medium_looks_up_author_then_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": "u123", "username": "someone" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/u123/posts"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "title": "Async Rust",
                "contentFormat": "markdown",
                "publishStatus": "public",
                "canonicalUrl": "https://dev.to/orig"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": {
                    "id": "p1",
                    "url": "https://medium.com/@someone/async-rust-p1",
                    "publishStatus": "public"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = MediumPublisher::new(Client::new(), &server.uri(), "tok", None);
        let result = publisher.publish(&medium_request("published")).await.unwrap();
        assert_eq!(result.status, PublishStatus::Published);
        assert_eq!(result.id.as_deref(), Some("p1"));
        assert_eq!(result.url.as_deref(), Some("https://medium.com/@someone/async-rust-p1"));
        assert_eq!(result.extra.get("author_id"), Some(&Value::String("u123".into())));
    }

    #[tokio::test]
    async fn medium_with_configured_author_skips_lookup() {
        let server = MockServer::start().await;
        Mock::given(path("/me"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/users/known/posts"))
            .and(body_partial_json(serde_json::json!({ "publishStatus": "draft" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "data": { "id": "p2", "publishStatus": "draft" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = MediumPublisher::new(Client::new(), &server.uri(), "tok", Some("known".into()));
        let result = publisher.publish(&medium_request("draft")).await.unwrap();
        assert_eq!(result.status, PublishStatus::Draft);
        assert!(result.url.is_none());
    }

    #[tokio::test]
    async fn medium_rejection_is_publish_error() {
        let server = MockServer::start().await;
        Mock::given(path("/users/known/posts"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Token was invalid."))
            .mount(&server)
            .await;

        let publisher = MediumPublisher::new(Client::new(), &server.uri(), "bad", Some("known".into()));
        let err = publisher.publish(&medium_request("draft")).await.unwrap_err();
        assert!(matches!(err, AutopressError::Publish(ref m) if m.contains("401")));
    }

    #[test]
    fn medium_without_key_is_config_error() {
        let err = MediumPublisher::from_config(&MediumPublishConfig::default()).unwrap_err();
        assert!(matches!(err, AutopressError::Config { .. }));
    }
}
