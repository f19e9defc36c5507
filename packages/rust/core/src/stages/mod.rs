//! The five pipeline stages and their collaborator traits.

pub mod filter;
pub mod publisher;
pub mod research;
pub mod scraper;
pub mod writer;

pub use filter::{FilterAgent, HeuristicSpamClassifier, KeywordRelevance, RelevanceScorer, SpamClassifier};
pub use publisher::{
    DevToPublisher, DryRunPublisher, MAX_TAGS, MediumPublisher, PublishRequest, Publisher,
    PublisherAgent, merge_tags,
};
pub use research::{ArchiveResearch, LlmResearch, ResearchAgent, ResearchProvider};
pub use scraper::ScraperAgent;
pub use writer::{ContentGenerator, LlmGenerator, TemplateGenerator, WriterAgent};
