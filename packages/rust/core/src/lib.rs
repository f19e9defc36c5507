//! Agents, monitoring, and orchestration for autopress.
//!
//! This crate ties sources, text analysis and storage together into the
//! five-stage pipeline (`Pipeline::run`).

pub mod agent;
pub mod llm;
pub mod monitoring;
pub mod pipeline;
pub mod stages;

pub use agent::{Agent, AgentContext, BatchOutcome, DEFAULT_RATE_LIMIT, process_each};
pub use llm::LlmClient;
pub use monitoring::{AgentMetricsSnapshot, DEFAULT_BUCKETS, Metrics};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineReport, PipelineState, ProgressReporter, SilentProgress,
};
