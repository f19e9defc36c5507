//! Bounded retry with exponential backoff around a source fetch.

use std::time::Duration;

use tracing::{debug, warn};

use autopress_shared::{Article, Result, ScraperConfig};

use crate::ArticleSource;

/// How many times to try a fetch and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Delay after the first failure; doubles after each further failure.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Delay before attempt `next` (2-based: the first retry).
    fn delay_before(&self, next: u32) -> Duration {
        let exponent = next.saturating_sub(2).min(16);
        self.backoff.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Call `source.fetch(limit)` until it succeeds or the policy's attempts run out.
///
/// Returns the last error when every attempt fails.
pub async fn fetch_with_retry(
    source: &dyn ArticleSource,
    limit: usize,
    policy: &RetryPolicy,
) -> Result<Vec<Article>> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match source.fetch(limit).await {
            Ok(articles) => {
                debug!(source = source.name(), attempt, "fetch succeeded");
                return Ok(articles);
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_before(attempt + 1);
                warn!(
                    source = source.name(),
                    attempt,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
