//! Dev.to (Forem) public API source.
//!
//! Lists recent articles, then fetches each article's Markdown body. A body
//! that cannot be fetched falls back to the listing's description.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use autopress_shared::{Article, AutopressError, DevToSourceConfig, Result};

use crate::ArticleSource;
use crate::http::{content_hash, get_json};

/// Registry name of this source.
pub const DEVTO: &str = "dev.to";

#[derive(Debug, Deserialize)]
struct ListedArticle {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    tag_list: Vec<String>,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user: Option<ListedUser>,
    #[serde(default)]
    reading_time_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ListedUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArticleBody {
    #[serde(default)]
    body_markdown: Option<String>,
}

/// Fetches articles from a Forem instance (dev.to by default).
pub struct DevToSource {
    client: Client,
    config: DevToSourceConfig,
}

impl DevToSource {
    pub fn new(client: Client, config: DevToSourceConfig) -> Self {
        Self { client, config }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn list_url(&self, limit: usize) -> Result<Url> {
        let per_page = (self.config.per_page as usize).min(limit.max(1));
        let mut url = Url::parse(&format!("{}/api/articles", self.base())).map_err(|e| {
            AutopressError::config(format!("invalid dev.to base_url {}: {e}", self.config.base_url))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("per_page", &per_page.to_string());
            if let Some(tag) = self.config.tag.as_deref().filter(|t| !t.is_empty()) {
                query.append_pair("tag", tag);
            }
        }
        Ok(url)
    }

    async fn body_for(&self, listed: &ListedArticle) -> Option<String> {
        let url = format!("{}/api/articles/{}", self.base(), listed.id);
        match get_json::<ArticleBody>(&self.client, &url).await {
            Ok(body) => body.body_markdown.filter(|b| !b.trim().is_empty()),
            Err(e) => {
                warn!(id = listed.id, title = %listed.title, error = %e, "body fetch failed, using description");
                None
            }
        }
    }
}

#[async_trait]
impl ArticleSource for DevToSource {
    fn name(&self) -> &str {
        DEVTO
    }

    #[instrument(skip(self), fields(source = DEVTO))]
    async fn fetch(&self, limit: usize) -> Result<Vec<Article>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let listed: Vec<ListedArticle> = get_json(&self.client, self.list_url(limit)?.as_str()).await?;
        debug!(count = listed.len(), "listed articles");

        let mut articles = Vec::new();
        for item in listed.into_iter().take(limit) {
            let content = match self.body_for(&item).await {
                Some(body) => Some(body),
                None => item.description.clone(),
            };

            let mut article = Article {
                title: item.title,
                url: item.url,
                source: Some(DEVTO.to_string()),
                author: item.user.map(|u| u.name),
                tags: (!item.tag_list.is_empty()).then_some(item.tag_list),
                published_at: item.published_at,
                ..Article::default()
            };
            if let Some(text) = content.as_deref() {
                article
                    .extra
                    .insert("content_hash".into(), Value::String(content_hash(text)));
            }
            if let Some(minutes) = item.reading_time_minutes {
                article
                    .extra
                    .insert("reading_time_minutes".into(), Value::from(minutes));
            }
            article.content = content;
            articles.push(article);
        }

        info!(count = articles.len(), "fetched dev.to articles");
        Ok(articles)
    }
}
