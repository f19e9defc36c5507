//! Application configuration for autopress.
//!
//! Config lives at `config/config.yaml` by default. The YAML is parsed into a
//! JSON value tree, `${VAR}` placeholders are resolved against the
//! environment, and the result is deserialized into typed per-stage blocks.
//! Absent keys take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AutopressError, Result};

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data";

// ---------------------------------------------------------------------------
// Config structs (matching config.yaml schema)
// ---------------------------------------------------------------------------

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub writer: WriterConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            scraper: ScraperConfig::default(),
            filter: FilterConfig::default(),
            research: ResearchConfig::default(),
            writer: WriterConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_rate_limit() -> u64 {
    1000
}

/// `scraper:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Source names to scrape, in order (`dev.to`, `medium`).
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Maximum articles kept per source.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,

    /// Total fetch attempts per source before giving up on it.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Initial backoff between attempts; doubles after each failure.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Delay before the stage starts processing.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    #[serde(default)]
    pub devto: DevToSourceConfig,

    #[serde(default)]
    pub medium: MediumSourceConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            max_articles: default_max_articles(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff(),
            rate_limit_ms: default_rate_limit(),
            devto: DevToSourceConfig::default(),
            medium: MediumSourceConfig::default(),
        }
    }
}

fn default_sources() -> Vec<String> {
    vec!["dev.to".into()]
}
fn default_max_articles() -> usize {
    10
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    500
}

/// `scraper.devto:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevToSourceConfig {
    #[serde(default = "default_devto_base_url")]
    pub base_url: String,

    /// Only list articles carrying this tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Page size requested from the listing endpoint.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for DevToSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_devto_base_url(),
            tag: None,
            per_page: default_per_page(),
        }
    }
}

fn default_devto_base_url() -> String {
    "https://dev.to".into()
}
fn default_per_page() -> u32 {
    30
}

/// `scraper.medium:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumSourceConfig {
    /// Explicit RSS feed URL. Overrides `tag`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,

    #[serde(default = "default_medium_tag")]
    pub tag: String,
}

impl Default for MediumSourceConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            tag: default_medium_tag(),
        }
    }
}

impl MediumSourceConfig {
    /// The feed to read: `feed_url` if set, else the tag feed.
    pub fn resolved_feed_url(&self) -> String {
        match &self.feed_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("https://medium.com/feed/tag/{}", self.tag),
        }
    }
}

fn default_medium_tag() -> String {
    "programming".into()
}

/// `filter:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_min_relevance")]
    pub min_relevance_score: f64,

    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Keywords the relevance scorer looks for.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Phrases that mark an article as spam (case-insensitive).
    #[serde(default)]
    pub spam_phrases: Vec<String>,

    /// Maximum URLs per word before an article counts as link spam.
    #[serde(default = "default_max_link_density")]
    pub max_link_density: f64,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_relevance_score: default_min_relevance(),
            min_word_count: default_min_word_count(),
            keywords: Vec::new(),
            spam_phrases: Vec::new(),
            max_link_density: default_max_link_density(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_min_relevance() -> f64 {
    0.7
}
fn default_min_word_count() -> usize {
    500
}
fn default_max_link_density() -> f64 {
    0.1
}

/// Settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
        }
    }
}

impl LlmConfig {
    /// The API key, treating an empty string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

/// Which research provider the research stage uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchProviderKind {
    /// Rank previously scraped articles in the data directory.
    #[default]
    Archive,
    /// Ask an LLM endpoint.
    Llm,
}

/// `research:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Research depth hint passed to the provider (`shallow`, `medium`, `deep`).
    #[serde(default = "default_depth")]
    pub depth: String,

    #[serde(default = "default_max_sources")]
    pub max_sources: usize,

    #[serde(default)]
    pub provider: ResearchProviderKind,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            max_sources: default_max_sources(),
            provider: ResearchProviderKind::default(),
            llm: LlmConfig::default(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_depth() -> String {
    "medium".into()
}
fn default_max_sources() -> usize {
    5
}

/// Which content generator the writer stage uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Deterministic Markdown assembled from the findings.
    #[default]
    Template,
    Llm,
}

/// `writer:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_style")]
    pub style: String,

    #[serde(default = "default_tone")]
    pub tone: String,

    #[serde(default)]
    pub generator: GeneratorKind,

    #[serde(default)]
    pub llm: LlmConfig,

    /// Drafts sharing a larger share of their word shingles with the
    /// research summaries are dropped.
    #[serde(default = "default_max_overlap")]
    pub max_overlap: f64,

    /// Shingle length, in words, for the overlap check.
    #[serde(default = "default_shingle_size")]
    pub shingle_size: usize,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            style: default_style(),
            tone: default_tone(),
            generator: GeneratorKind::default(),
            llm: LlmConfig::default(),
            max_overlap: default_max_overlap(),
            shingle_size: default_shingle_size(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_style() -> String {
    "professional".into()
}
fn default_tone() -> String {
    "neutral".into()
}
fn default_max_overlap() -> f64 {
    0.8
}
fn default_shingle_size() -> usize {
    5
}

/// Where the publish stage sends articles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishTarget {
    /// Record results locally without submitting anything.
    #[default]
    DryRun,
    Devto,
    Medium,
}

/// `publisher.devto:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevToPublishConfig {
    #[serde(default = "default_devto_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for DevToPublishConfig {
    fn default() -> Self {
        Self {
            base_url: default_devto_base_url(),
            api_key: None,
        }
    }
}

/// `publisher.medium:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumPublishConfig {
    #[serde(default = "default_medium_api_url")]
    pub base_url: String,

    /// Integration token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Author to post as. Looked up from the token when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

impl Default for MediumPublishConfig {
    fn default() -> Self {
        Self {
            base_url: default_medium_api_url(),
            api_key: None,
            author_id: None,
        }
    }
}

fn default_medium_api_url() -> String {
    "https://api.medium.com/v1".into()
}

/// `publisher:` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Requested status on the target: `draft`, `public` or `published`.
    #[serde(default = "default_status")]
    pub status: String,

    /// Tags appended to every submission.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub target: PublishTarget,

    #[serde(default)]
    pub devto: DevToPublishConfig,

    #[serde(default)]
    pub medium: MediumPublishConfig,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            status: default_status(),
            tags: Vec::new(),
            target: PublishTarget::default(),
            devto: DevToPublishConfig::default(),
            medium: MediumPublishConfig::default(),
            rate_limit_ms: default_rate_limit(),
        }
    }
}

fn default_status() -> String {
    "draft".into()
}

// ---------------------------------------------------------------------------
// Environment substitution
// ---------------------------------------------------------------------------

/// Extract `NAME` from a value of the exact form `${NAME}`.
fn placeholder_name(s: &str) -> Option<&str> {
    s.strip_prefix("${")?.strip_suffix('}')
}

/// Resolve `${VAR}` placeholders throughout a value tree.
///
/// Only strings that are entirely a placeholder are substituted. A variable
/// that `lookup` cannot resolve makes the value absent: the key is removed
/// from its mapping, the element is removed from its sequence, and a bare
/// root placeholder yields `None`.
pub fn substitute_env(value: Value, lookup: &dyn Fn(&str) -> Option<String>) -> Option<Value> {
    match value {
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| substitute_env(v, lookup).map(|v| (k, v)))
                .collect::<Map<String, Value>>(),
        )),
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .filter_map(|v| substitute_env(v, lookup))
                .collect(),
        )),
        Value::String(s) => match placeholder_name(&s) {
            Some(name) => lookup(name).map(Value::String),
            None => Some(Value::String(s)),
        },
        other => Some(other),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Parse YAML config text, resolving placeholders through `lookup`.
pub fn parse_config(yaml: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<AppConfig> {
    if yaml.trim().is_empty() {
        return Ok(AppConfig::default());
    }

    let raw: Value = serde_yaml_bw::from_str(yaml)
        .map_err(|e| AutopressError::config(format!("invalid YAML: {e}")))?;

    match substitute_env(raw, lookup) {
        None | Some(Value::Null) => Ok(AppConfig::default()),
        Some(resolved) => serde_json::from_value(resolved)
            .map_err(|e| AutopressError::config(format!("invalid configuration: {e}"))),
    }
}

/// Load config from `path`, resolving placeholders from the process environment.
/// Returns defaults if the file does not exist.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(path)
}

/// Load config from a specific file path, which must exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AutopressError::io(path, e))?;

    parse_config(&content, &|name| std::env::var(name).ok()).map_err(|e| match e {
        AutopressError::Config { message } => {
            AutopressError::config(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}
