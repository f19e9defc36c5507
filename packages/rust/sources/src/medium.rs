//! Medium RSS source.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, instrument, warn};

use autopress_shared::{Article, AutopressError, MediumSourceConfig, Result};

use crate::ArticleSource;
use crate::http::{content_hash, get_bytes};

/// Registry name of this source.
pub const MEDIUM: &str = "medium";

/// Reads a Medium tag (or any RSS/Atom) feed and converts entry HTML to Markdown.
pub struct MediumSource {
    client: Client,
    feed_url: String,
}

impl MediumSource {
    pub fn new(client: Client, config: &MediumSourceConfig) -> Self {
        Self {
            client,
            feed_url: config.resolved_feed_url(),
        }
    }
}

#[async_trait]
impl ArticleSource for MediumSource {
    fn name(&self) -> &str {
        MEDIUM
    }

    #[instrument(skip(self), fields(source = MEDIUM, feed = %self.feed_url))]
    async fn fetch(&self, limit: usize) -> Result<Vec<Article>> {
        let bytes = get_bytes(&self.client, &self.feed_url).await?;
        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| AutopressError::parse(format!("{}: invalid feed: {e}", self.feed_url)))?;

        let mut articles = Vec::new();
        for entry in feed.entries.into_iter().take(limit) {
            let url = entry.links.first().map(|l| l.href.clone());
            let html = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content));

            let content = match html {
                Some(html) => match autopress_text::html_to_markdown(&html, url.as_deref()) {
                    Ok(md) => Some(md),
                    Err(e) => {
                        warn!(entry = %entry.id, error = %e, "could not convert entry body");
                        None
                    }
                },
                None => None,
            };

            let tags: Vec<String> = entry.categories.into_iter().map(|c| c.term).collect();

            let mut article = Article {
                title: entry.title.map(|t| t.content.trim().to_string()).unwrap_or_default(),
                url,
                source: Some(MEDIUM.to_string()),
                author: entry.authors.first().map(|a| a.name.clone()),
                tags: (!tags.is_empty()).then_some(tags),
                published_at: entry.published.or(entry.updated),
                ..Article::default()
            };
            if let Some(text) = content.as_deref() {
                article
                    .extra
                    .insert("content_hash".into(), Value::String(content_hash(text)));
            }
            article.content = content;
            articles.push(article);
        }

        info!(count = articles.len(), "fetched medium articles");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Rust on Medium</title>
    <link>https://medium.com/tag/rust</link>
    <description>Latest stories tagged with Rust</description>
    <item>
      <title>Zero-Cost Abstractions</title>
      <link>https://medium.com/@ann/zero-cost-abstractions-1</link>
      <guid isPermaLink="false">https://medium.com/p/1</guid>
      <category>rust</category>
      <category>performance</category>
      <dc:creator>Ann</dc:creator>
      <pubDate>Tue, 05 Mar 2024 09:00:00 GMT</pubDate>
      <content:encoded><![CDATA[<h3>Intro</h3><p>Iterators compile to <em>tight</em> loops.</p>]]></content:encoded>
    </item>
    <item>
      <title>Second Story</title>
      <link>https://medium.com/@bob/second-story-2</link>
      <guid isPermaLink="false">https://medium.com/p/2</guid>
      <content:encoded><![CDATA[<p>Second body</p>]]></content:encoded>
    </item>
  </channel>
</rss>"#;

    fn source(server: &MockServer) -> MediumSource {
        MediumSource::new(
            build_client().unwrap(),
            &MediumSourceConfig {
                feed_url: Some(format!("{}/feed/tag/rust", server.uri())),
                tag: "rust".into(),
            },
        )
    }

    #[tokio::test]
    async fn parses_feed_entries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed/tag/rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let articles = source(&server).fetch(10).await.unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Zero-Cost Abstractions");
        assert_eq!(first.source.as_deref(), Some("medium"));
        assert_eq!(
            first.url.as_deref(),
            Some("https://medium.com/@ann/zero-cost-abstractions-1")
        );
        let content = first.content_or_empty();
        assert!(content.contains("### Intro"));
        assert!(content.contains("tight"));
        assert!(!content.contains("<p>"));
        assert_eq!(
            first.tags,
            Some(vec!["rust".to_string(), "performance".to_string()])
        );
        assert!(first.published_at.is_some());
        assert!(first.extra.contains_key("content_hash"));
    }

    #[tokio::test]
    async fn truncates_to_limit() {
        let server = MockServer::start().await;
        Mock::given(path("/feed/tag/rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let articles = source(&server).fetch(1).await.unwrap();
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn garbage_feed_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(path("/feed/tag/rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a feed"))
            .mount(&server)
            .await;

        let err = source(&server).fetch(5).await.unwrap_err();
        assert!(matches!(err, AutopressError::Parse { .. }));
    }
}
