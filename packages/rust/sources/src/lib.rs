//! Article sources for the scrape stage.
//!
//! This crate provides:
//! - [`ArticleSource`]: the fetch contract every source implements
//! - [`DevToSource`] and [`MediumSource`]: the built-in sources
//! - [`SourceRegistry`]: looks sources up by their configured name
//! - [`fetch_with_retry`]: bounded retry with exponential backoff

pub mod devto;
pub mod http;
pub mod medium;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;

use autopress_shared::{Article, Result, ScraperConfig};

pub use devto::{DEVTO, DevToSource};
pub use http::{build_client, content_hash};
pub use medium::{MEDIUM, MediumSource};
pub use retry::{RetryPolicy, fetch_with_retry};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A place articles can be scraped from.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Name used in the `scraper.sources` config list.
    fn name(&self) -> &str;

    /// Fetch up to `limit` recent articles.
    async fn fetch(&self, limit: usize) -> Result<Vec<Article>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Sources addressable by name.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn ArticleSource>>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in sources, sharing one HTTP client.
    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        let client = build_client()?;
        let mut registry = Self::new();
        registry.register(Arc::new(DevToSource::new(
            client.clone(),
            config.devto.clone(),
        )));
        registry.register(Arc::new(MediumSource::new(client, &config.medium)));
        Ok(registry)
    }

    /// Add a source. A later source with the same name replaces the earlier one.
    pub fn register(&mut self, source: Arc<dyn ArticleSource>) {
        self.sources.retain(|s| s.name() != source.name());
        self.sources.push(source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ArticleSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, usize);

    #[async_trait]
    impl ArticleSource for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn fetch(&self, _limit: usize) -> Result<Vec<Article>> {
            Ok(vec![Article::default(); self.1])
        }
    }

    #[test]
    fn builtin_sources_registered() {
        let registry = SourceRegistry::from_config(&ScraperConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["dev.to", "medium"]);
        assert!(registry.get("dev.to").is_some());
        assert!(registry.get("hackernews").is_none());
    }

    #[tokio::test]
    async fn register_replaces_same_name() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(Named("dev.to", 1)));
        registry.register(Arc::new(Named("dev.to", 3)));

        assert_eq!(registry.names(), vec!["dev.to"]);
        let source = registry.get("dev.to").unwrap();
        assert_eq!(source.fetch(10).await.unwrap().len(), 3);
    }
}
