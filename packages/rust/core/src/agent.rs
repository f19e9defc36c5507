//! The agent contract shared by every pipeline stage.
//!
//! A stage implements [`Agent::process`]; callers go through the provided
//! [`Agent::execute`], which runs the rate-limit delay and the stage under the
//! monitoring middleware and logs top-level errors. The recorded processing
//! time therefore includes the delay. Per-item work inside `process`
//! goes through [`process_each`] so one bad item never fails the batch.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{Instrument, debug, error, info_span};

use autopress_shared::{AutopressError, Result, Titled};
use autopress_storage::{JsonStore, slugify_title};

use crate::monitoring::Metrics;

/// Delay applied before each stage unless its config says otherwise.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// What every stage shares: the data store, the metrics registry, and its
/// own rate-limit delay.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub store: JsonStore,
    pub metrics: Arc<Metrics>,
    pub rate_limit: Duration,
}

impl AgentContext {
    pub fn new(store: JsonStore, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            metrics,
            rate_limit: DEFAULT_RATE_LIMIT,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Save `record` under `subdir`, keyed by its slugged title.
    pub fn persist<T: Serialize + Titled>(&self, record: &T, subdir: &str) -> Result<PathBuf> {
        let title = record.title();
        if title.trim().is_empty() {
            return Err(AutopressError::validation(format!(
                "record for {subdir} has an empty title"
            )));
        }
        self.store.save_data(record, &slugify_title(title), subdir)
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A pipeline stage.
#[async_trait]
pub trait Agent: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Stage name, used as the `agent` log field and metrics key.
    fn name(&self) -> &'static str;

    fn context(&self) -> &AgentContext;

    /// Transform the predecessor's output. Individual bad items are dropped,
    /// not returned as errors.
    async fn process(&self, input: Self::Input) -> Result<Self::Output>;

    /// Rate-limit, then run [`process`](Self::process), both under the
    /// monitoring middleware. Errors are logged with the agent name and
    /// returned.
    async fn execute(&self, input: Self::Input) -> Result<Self::Output> {
        let name = self.name();
        let ctx = self.context();

        let run = async move {
            if !ctx.rate_limit.is_zero() {
                debug!(delay_ms = ctx.rate_limit.as_millis() as u64, "rate limit");
                tokio::time::sleep(ctx.rate_limit).await;
            }
            self.process(input).await
        };

        async move {
            let result = Metrics::instrument(&ctx.metrics, name, run).await;
            if let Err(e) = &result {
                error!(agent = name, error = %e, "agent failed");
            }
            result
        }
        .instrument(info_span!("agent", agent = name))
        .await
    }
}

// ---------------------------------------------------------------------------
// Per-item isolation
// ---------------------------------------------------------------------------

/// Result of running a step over a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<U> {
    /// Kept items, in input order.
    pub items: Vec<U>,
    /// Items the step chose to drop.
    pub filtered: usize,
    /// Titles of items whose step failed.
    pub failed: Vec<String>,
}

/// Run `step` over each item in order.
///
/// `Ok(Some(u))` keeps `u`, `Ok(None)` drops the item as filtered, and an
/// error drops it after logging one error line with its title.
pub async fn process_each<T, U, F, Fut>(agent: &str, items: Vec<T>, mut step: F) -> BatchOutcome<U>
where
    T: Titled,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<Option<U>>>,
{
    let mut outcome = BatchOutcome {
        items: Vec::with_capacity(items.len()),
        filtered: 0,
        failed: Vec::new(),
    };

    for item in items {
        let title = item.title().to_string();
        match step(item).await {
            Ok(Some(kept)) => outcome.items.push(kept),
            Ok(None) => outcome.filtered += 1,
            Err(e) => {
                error!(agent, title = %title, error = %e, "item failed");
                outcome.failed.push(title);
            }
        }
    }

    debug!(
        agent,
        kept = outcome.items.len(),
        filtered = outcome.filtered,
        failed = outcome.failed.len(),
        "batch complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopress_shared::Article;

    use crate::monitoring::DEFAULT_BUCKETS;

    fn ctx() -> (tempfile::TempDir, AgentContext) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = AgentContext::new(JsonStore::new(dir.path()), Arc::new(Metrics::new()))
            .with_rate_limit(Duration::ZERO);
        (dir, ctx)
    }

    /// Doubles its input, or fails when told to.
    struct Doubler {
        ctx: AgentContext,
        fail: bool,
    }

    #[async_trait]
    impl Agent for Doubler {
        type Input = u32;
        type Output = u32;

        fn name(&self) -> &'static str {
            "Doubler"
        }

        fn context(&self) -> &AgentContext {
            &self.ctx
        }

        async fn process(&self, input: u32) -> Result<u32> {
            if self.fail {
                Err(AutopressError::Generation("boom".into()))
            } else {
                Ok(input * 2)
            }
        }
    }

    #[tokio::test]
    async fn execute_passes_output_through() {
        let (_dir, ctx) = ctx();
        let agent = Doubler { ctx, fail: false };
        assert_eq!(agent.execute(21).await.unwrap(), 42);

        let s = agent.ctx.metrics.snapshot("Doubler").unwrap();
        assert_eq!((s.requests, s.errors, s.active), (1, 0, 0));
    }

    #[tokio::test]
    async fn execute_returns_error_and_counts_it_once() {
        let (_dir, ctx) = ctx();
        let agent = Doubler { ctx, fail: true };

        let err = agent.execute(1).await.unwrap_err();
        assert!(matches!(err, AutopressError::Generation(_)));

        let s = agent.ctx.metrics.snapshot("Doubler").unwrap();
        assert_eq!((s.requests, s.errors, s.active), (1, 1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn execute_waits_for_rate_limit() {
        let (_dir, ctx) = ctx();
        let agent = Doubler {
            ctx: ctx.with_rate_limit(Duration::from_millis(1500)),
            fail: false,
        };

        let start = tokio::time::Instant::now();
        agent.execute(1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));

        let s = agent.ctx.metrics.snapshot("Doubler").unwrap();
        assert_eq!(s.observations, 1);
        assert!(s.total_seconds >= 1.5);
        // Paused time only advances during the sleep.
        assert_eq!(s.buckets[DEFAULT_BUCKETS.len() - 4], (1.0, 0));
        assert_eq!(s.buckets[DEFAULT_BUCKETS.len() - 3], (2.5, 1));
    }

    #[tokio::test]
    async fn process_each_keeps_order_and_isolates_failures() {
        let items = vec![
            Article::new("one", "a"),
            Article::new("two", "b"),
            Article::new("three", "c"),
            Article::new("four", "d"),
        ];

        let outcome = process_each("Test", items, |article| async move {
            match article.title.as_str() {
                "two" => Err(AutopressError::validation("bad item")),
                "three" => Ok(None),
                _ => Ok(Some(article.title)),
            }
        })
        .await;

        assert_eq!(outcome.items, vec!["one", "four"]);
        assert_eq!(outcome.filtered, 1);
        assert_eq!(outcome.failed, vec!["two"]);
    }

    #[test]
    fn persist_uses_slugged_title() {
        let (dir, ctx) = ctx();
        let path = ctx
            .persist(&Article::new("Hello World", "x"), "drafts")
            .unwrap();
        assert_eq!(path, dir.path().join("drafts").join("hello_world.json"));
    }

    #[test]
    fn persist_rejects_empty_title() {
        let (_dir, ctx) = ctx();
        let err = ctx.persist(&Article::new("  ", "x"), "drafts").unwrap_err();
        assert!(matches!(err, AutopressError::Validation { .. }));
    }
}
