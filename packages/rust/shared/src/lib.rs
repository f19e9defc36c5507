//! Shared types, error model, and configuration for autopress.
//!
//! This crate is the foundation depended on by all other autopress crates.
//! It provides:
//! - [`AutopressError`]: the unified error type
//! - Record types ([`Article`], [`Finding`], [`PublishResult`])
//! - Configuration ([`AppConfig`] and per-stage blocks, env substitution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_DATA_DIR, DevToPublishConfig, DevToSourceConfig,
    FilterConfig, GeneratorKind, LlmConfig, MediumPublishConfig, MediumSourceConfig, PublishTarget,
    PublisherConfig,
    ResearchConfig, ResearchProviderKind, ScraperConfig, WriterConfig, load_config,
    load_config_from, parse_config, substitute_env,
};
pub use error::{AutopressError, Result};
pub use types::{
    Article, DraftMetadata, Finding, PublishResult, PublishStatus, ResearchRecord, Titled,
};
