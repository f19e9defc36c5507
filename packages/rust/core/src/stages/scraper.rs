//! Scrape stage: fetch articles from every configured source.

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use autopress_shared::{Article, Result, ScraperConfig};
use autopress_sources::{RetryPolicy, SourceRegistry, fetch_with_retry};
use autopress_storage::RAW_CONTENT;

use crate::agent::{Agent, AgentContext, process_each};

pub struct ScraperAgent {
    config: ScraperConfig,
    sources: SourceRegistry,
    ctx: AgentContext,
}

impl ScraperAgent {
    pub fn new(config: ScraperConfig, sources: SourceRegistry, ctx: AgentContext) -> Self {
        Self {
            config,
            sources,
            ctx,
        }
    }

    async fn save_raw(&self, article: Article) -> Result<Option<Article>> {
        self.ctx.persist(&article, RAW_CONTENT)?;
        Ok(Some(article))
    }
}

#[async_trait]
impl Agent for ScraperAgent {
    type Input = ();
    type Output = Vec<Article>;

    fn name(&self) -> &'static str {
        "ScraperAgent"
    }

    fn context(&self) -> &AgentContext {
        &self.ctx
    }

    #[instrument(skip_all, fields(sources = ?self.config.sources))]
    async fn process(&self, _input: ()) -> Result<Vec<Article>> {
        // An unwritable data directory fails the stage, not every item.
        self.ctx.store.ensure_subdir(RAW_CONTENT)?;

        let policy = RetryPolicy::from_config(&self.config);
        let limit = self.config.max_articles;
        let mut combined = Vec::new();

        for name in &self.config.sources {
            let Some(source) = self.sources.get(name) else {
                warn!(source = %name, known = ?self.sources.names(), "unknown source, skipping");
                continue;
            };

            let fetched = match fetch_with_retry(source.as_ref(), limit, &policy).await {
                Ok(articles) => articles,
                Err(e) => {
                    error!(source = %name, attempts = policy.attempts, error = %e, "source failed, skipping");
                    continue;
                }
            };

            let truncated: Vec<Article> = fetched.into_iter().take(limit).collect();
            let outcome =
                process_each(self.name(), truncated, |article| self.save_raw(article)).await;

            info!(source = %name, count = outcome.items.len(), "scraped source");
            combined.extend(outcome.items);
        }

        info!(total = combined.len(), "scrape complete");
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use autopress_shared::AutopressError;
    use autopress_sources::ArticleSource;
    use autopress_storage::JsonStore;

    use crate::monitoring::Metrics;

    struct Fixed {
        name: &'static str,
        count: usize,
    }

    #[async_trait]
    impl ArticleSource for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<Article>> {
            Ok((0..self.count)
                .map(|i| Article::new(format!("{} post {i}", self.name), "body"))
                .collect())
        }
    }

    struct Failing {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ArticleSource for Failing {
        fn name(&self) -> &str {
            "medium"
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<Article>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AutopressError::Network("down".into()))
        }
    }

    fn agent(
        dir: &tempfile::TempDir,
        sources: Vec<&str>,
        registry: SourceRegistry,
    ) -> ScraperAgent {
        let config = ScraperConfig {
            sources: sources.into_iter().map(String::from).collect(),
            max_articles: 3,
            retry_attempts: 2,
            retry_backoff_ms: 1,
            ..ScraperConfig::default()
        };
        let ctx = AgentContext::new(JsonStore::new(dir.path()), Arc::new(Metrics::new()))
            .with_rate_limit(Duration::ZERO);
        ScraperAgent::new(config, registry, ctx)
    }

    #[tokio::test]
    async fn truncates_persists_and_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Fixed { name: "dev.to", count: 5 }));
        registry.register(Arc::new(Fixed { name: "medium", count: 1 }));

        let scraper = agent(&dir, vec!["dev.to", "medium"], registry);
        let articles = scraper.execute(()).await.unwrap();

        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["dev.to post 0", "dev.to post 1", "dev.to post 2", "medium post 0"]
        );
        assert!(dir.path().join("raw_content/dev.to_post_2.json").exists());
        assert!(!dir.path().join("raw_content/dev.to_post_3.json").exists());
    }

    #[tokio::test]
    async fn unknown_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Fixed { name: "dev.to", count: 1 }));

        let scraper = agent(&dir, vec!["hackernews", "dev.to"], registry);
        let articles = scraper.execute(()).await.unwrap();
        assert_eq!(articles.len(), 1);
    }

    #[tokio::test]
    async fn failing_source_skipped_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let failing = Arc::new(Failing {
            calls: AtomicU32::new(0),
        });
        let mut registry = SourceRegistry::new();
        registry.register(failing.clone());
        registry.register(Arc::new(Fixed { name: "dev.to", count: 2 }));

        let scraper = agent(&dir, vec!["medium", "dev.to"], registry);
        let articles = scraper.execute(()).await.unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn untitled_article_is_dropped() {
        struct Untitled;

        #[async_trait]
        impl ArticleSource for Untitled {
            fn name(&self) -> &str {
                "dev.to"
            }

            async fn fetch(&self, _limit: usize) -> Result<Vec<Article>> {
                Ok(vec![Article::new("", "orphan"), Article::new("Kept", "body")])
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Untitled));

        let scraper = agent(&dir, vec!["dev.to"], registry);
        let articles = scraper.execute(()).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Kept");
    }
}
