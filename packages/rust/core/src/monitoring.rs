//! Per-agent request metrics and the middleware that records them.
//!
//! [`Metrics`] is created once per pipeline and shared by `Arc` with every
//! stage context. [`Metrics::instrument`] wraps a stage's future and records:
//! - a request counter and an error counter
//! - an active-request gauge
//! - a processing-time histogram (seconds)
//!
//! Timing uses the tokio clock, so it covers time spent in `tokio::time::sleep`
//! and follows paused test time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::info;

use autopress_shared::Result;

/// Upper bounds of the latency histogram buckets, in seconds. An implicit
/// `+Inf` bucket follows the last one.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

// ---------------------------------------------------------------------------
// Per-agent state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Histogram {
    /// Non-cumulative counts; the last slot is `+Inf`.
    counts: [u64; DEFAULT_BUCKETS.len() + 1],
    sum: f64,
    observations: u64,
}

impl Histogram {
    fn observe(&mut self, seconds: f64) {
        let slot = DEFAULT_BUCKETS
            .iter()
            .position(|bound| seconds <= *bound)
            .unwrap_or(DEFAULT_BUCKETS.len());
        self.counts[slot] += 1;
        self.sum += seconds;
        self.observations += 1;
    }
}

#[derive(Debug, Default)]
struct AgentMetrics {
    requests: AtomicU64,
    errors: AtomicU64,
    active: AtomicI64,
    latency: Mutex<Histogram>,
}

/// Decrements the active gauge when dropped, so a cancelled future does not
/// leave the gauge raised.
struct ActiveGuard(Arc<AgentMetrics>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of one agent's metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentMetricsSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub active: i64,
    pub observations: u64,
    pub total_seconds: f64,
    /// Cumulative `(upper_bound, count)` pairs ending with `+Inf`.
    pub buckets: Vec<(f64, u64)>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Thread-safe registry of per-agent metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    agents: RwLock<HashMap<String, Arc<AgentMetrics>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn agent(&self, name: &str) -> Arc<AgentMetrics> {
        if let Some(existing) = self.agents.read().get(name) {
            return Arc::clone(existing);
        }
        Arc::clone(self.agents.write().entry(name.to_string()).or_default())
    }

    /// Run `fut`, recording it against `agent`. The result passes through
    /// unchanged.
    pub async fn instrument<T, F>(&self, agent: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let entry = self.agent(agent);
        entry.requests.fetch_add(1, Ordering::Relaxed);
        entry.active.fetch_add(1, Ordering::Relaxed);
        let guard = ActiveGuard(Arc::clone(&entry));

        let start = Instant::now();
        let result = fut.await;
        let elapsed = start.elapsed().as_secs_f64();

        entry.latency.lock().observe(elapsed);
        if result.is_err() {
            entry.errors.fetch_add(1, Ordering::Relaxed);
        }
        drop(guard);

        result
    }

    /// Current metrics for `agent`, or `None` if it has never been instrumented.
    pub fn snapshot(&self, agent: &str) -> Option<AgentMetricsSnapshot> {
        let entry = self.agents.read().get(agent).cloned()?;
        let latency = entry.latency.lock();

        let mut cumulative = 0;
        let bounds = DEFAULT_BUCKETS.iter().copied().chain(std::iter::once(f64::INFINITY));
        let buckets = bounds
            .zip(latency.counts.iter())
            .map(|(bound, count)| {
                cumulative += count;
                (bound, cumulative)
            })
            .collect();

        Some(AgentMetricsSnapshot {
            requests: entry.requests.load(Ordering::Relaxed),
            errors: entry.errors.load(Ordering::Relaxed),
            active: entry.active.load(Ordering::Relaxed),
            observations: latency.observations,
            total_seconds: latency.sum,
            buckets,
        })
    }

    /// Names of every instrumented agent, sorted.
    pub fn agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Log one summary line per agent.
    pub fn log_summary(&self) {
        for name in self.agents() {
            if let Some(s) = self.snapshot(&name) {
                info!(
                    agent = %name,
                    requests = s.requests,
                    errors = s.errors,
                    total_ms = (s.total_seconds * 1000.0) as u64,
                    "agent metrics"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopress_shared::AutopressError;

    #[tokio::test]
    async fn success_counts_request_only() {
        let metrics = Metrics::new();
        let value = metrics.instrument("FilterAgent", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let s = metrics.snapshot("FilterAgent").unwrap();
        assert_eq!(s.requests, 1);
        assert_eq!(s.errors, 0);
        assert_eq!(s.active, 0);
        assert_eq!(s.observations, 1);
    }

    #[tokio::test]
    async fn failure_counts_one_error_and_passes_it_through() {
        let metrics = Metrics::new();
        let result: Result<()> = metrics
            .instrument("WriterAgent", async {
                Err(AutopressError::Generation("model offline".into()))
            })
            .await;
        assert!(matches!(result, Err(AutopressError::Generation(ref m)) if m == "model offline"));

        let s = metrics.snapshot("WriterAgent").unwrap();
        assert_eq!(s.requests, 1);
        assert_eq!(s.errors, 1);
        assert_eq!(s.active, 0);
    }

    #[tokio::test]
    async fn gauge_is_raised_while_running() {
        let metrics = Arc::new(Metrics::new());
        let inner = Arc::clone(&metrics);
        metrics
            .instrument("ScraperAgent", async move {
                assert_eq!(inner.snapshot("ScraperAgent").unwrap().active, 1);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(metrics.snapshot("ScraperAgent").unwrap().active, 0);
    }

    #[tokio::test]
    async fn buckets_are_cumulative_and_end_with_inf() {
        let metrics = Metrics::new();
        metrics.instrument("A", async { Ok(()) }).await.unwrap();

        let s = metrics.snapshot("A").unwrap();
        assert_eq!(s.buckets.len(), DEFAULT_BUCKETS.len() + 1);
        let (last_bound, last_count) = *s.buckets.last().unwrap();
        assert!(last_bound.is_infinite());
        assert_eq!(last_count, 1);
        assert!(s.buckets.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn unknown_agent_has_no_snapshot() {
        let metrics = Metrics::new();
        assert!(metrics.snapshot("nobody").is_none());
        assert!(metrics.agents().is_empty());
    }

    #[test]
    fn histogram_places_values_in_first_fitting_bucket() {
        let mut h = Histogram::default();
        h.observe(0.003);
        h.observe(0.3);
        h.observe(60.0);
        assert_eq!(h.counts[0], 1);
        assert_eq!(h.counts[6], 1);
        assert_eq!(h.counts[DEFAULT_BUCKETS.len()], 1);
        assert_eq!(h.observations, 3);
    }
}
