//! End-to-end run: scrape, filter, research, write, publish.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, instrument, warn};

use autopress_shared::{
    AppConfig, AutopressError, GeneratorKind, PublishResult, PublishTarget, ResearchProviderKind,
    Result,
};
use autopress_sources::SourceRegistry;
use autopress_storage::JsonStore;

use crate::agent::{Agent, AgentContext};
use crate::llm::LlmClient;
use crate::monitoring::Metrics;
use crate::stages::{
    ArchiveResearch, ContentGenerator, DevToPublisher, DryRunPublisher, FilterAgent,
    HeuristicSpamClassifier, KeywordRelevance, LlmGenerator, LlmResearch, MediumPublisher, Publisher,
    PublisherAgent, RelevanceScorer, ResearchAgent, ResearchProvider, ScraperAgent,
    SpamClassifier, TemplateGenerator, WriterAgent,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a run is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Scraping,
    Filtering,
    Researching,
    Writing,
    Publishing,
    Done,
    /// Scrape returned nothing.
    NoArticlesFound,
    /// Nothing survived the filter.
    NoArticlesPassedFilter,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scraping => "scraping",
            Self::Filtering => "filtering",
            Self::Researching => "researching",
            Self::Writing => "writing",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::NoArticlesFound => "no_articles_found",
            Self::NoArticlesPassedFilter => "no_articles_passed_filter",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done | Self::NoArticlesFound | Self::NoArticlesPassedFilter
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Terminal state the run ended in.
    pub outcome: PipelineState,
    pub published: Vec<PublishResult>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callbacks for rendering a run.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn phase(&self, state: PipelineState);
    /// Called once when the run ends without error.
    fn done(&self, report: &PipelineReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _state: PipelineState) {}
    fn done(&self, _report: &PipelineReport) {}
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Owns every stage plus the shared store and metrics.
pub struct Pipeline {
    scraper: ScraperAgent,
    filter: FilterAgent,
    research: ResearchAgent,
    writer: WriterAgent,
    publisher: PublisherAgent,
    store: JsonStore,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    /// Build every stage with its default collaborators.
    pub fn from_config(config: &AppConfig, data_dir: impl Into<PathBuf>) -> Result<Self> {
        PipelineBuilder::new(config.clone(), data_dir).build()
    }

    pub fn builder(config: AppConfig, data_dir: impl Into<PathBuf>) -> PipelineBuilder {
        PipelineBuilder::new(config, data_dir)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Run every stage in order.
    ///
    /// Empty scrape or filter results end the run early with a warning and
    /// an `Ok` report. Any stage error aborts the run and is returned.
    #[instrument(skip_all, fields(data_dir = %self.store.data_dir().display()))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<PipelineReport> {
        let start = Instant::now();
        info!("starting pipeline");

        progress.phase(PipelineState::Scraping);
        let scraped = self
            .scraper
            .execute(())
            .await
            .map_err(|e| failed(PipelineState::Scraping, e))?;
        if scraped.is_empty() {
            warn!("no articles found");
            return Ok(self.finish(PipelineState::NoArticlesFound, Vec::new(), start, progress));
        }

        progress.phase(PipelineState::Filtering);
        let filtered = self
            .filter
            .execute(scraped)
            .await
            .map_err(|e| failed(PipelineState::Filtering, e))?;
        if filtered.is_empty() {
            warn!("no articles passed the filter");
            return Ok(self.finish(
                PipelineState::NoArticlesPassedFilter,
                Vec::new(),
                start,
                progress,
            ));
        }

        progress.phase(PipelineState::Researching);
        let researched = self
            .research
            .execute(filtered)
            .await
            .map_err(|e| failed(PipelineState::Researching, e))?;

        progress.phase(PipelineState::Writing);
        let drafts = self
            .writer
            .execute(researched)
            .await
            .map_err(|e| failed(PipelineState::Writing, e))?;

        progress.phase(PipelineState::Publishing);
        let published = self
            .publisher
            .execute(drafts)
            .await
            .map_err(|e| failed(PipelineState::Publishing, e))?;

        Ok(self.finish(PipelineState::Done, published, start, progress))
    }

    fn finish(
        &self,
        outcome: PipelineState,
        published: Vec<PublishResult>,
        start: Instant,
        progress: &dyn ProgressReporter,
    ) -> PipelineReport {
        let report = PipelineReport {
            outcome,
            published,
            elapsed: start.elapsed(),
        };
        self.metrics.log_summary();
        info!(
            outcome = %report.outcome,
            published = report.published.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline finished"
        );
        progress.done(&report);
        report
    }
}

fn failed(state: PipelineState, e: AutopressError) -> AutopressError {
    error!(state = %state, error = %e, "pipeline failed");
    e
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a [`Pipeline`], letting callers replace any collaborator.
pub struct PipelineBuilder {
    config: AppConfig,
    data_dir: PathBuf,
    metrics: Option<Arc<Metrics>>,
    sources: Option<SourceRegistry>,
    scorer: Option<Arc<dyn RelevanceScorer>>,
    spam: Option<Arc<dyn SpamClassifier>>,
    research: Option<Arc<dyn ResearchProvider>>,
    generator: Option<Arc<dyn ContentGenerator>>,
    publisher: Option<Arc<dyn Publisher>>,
    rate_limit: Option<Duration>,
}

impl PipelineBuilder {
    pub fn new(config: AppConfig, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            data_dir: data_dir.into(),
            metrics: None,
            sources: None,
            scorer: None,
            spam: None,
            research: None,
            generator: None,
            publisher: None,
            rate_limit: None,
        }
    }

    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sources(mut self, sources: SourceRegistry) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn spam_classifier(mut self, spam: Arc<dyn SpamClassifier>) -> Self {
        self.spam = Some(spam);
        self
    }

    pub fn research_provider(mut self, provider: Arc<dyn ResearchProvider>) -> Self {
        self.research = Some(provider);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Use one rate-limit delay for every stage instead of the configured ones.
    pub fn rate_limit(mut self, delay: Duration) -> Self {
        self.rate_limit = Some(delay);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let config = self.config;
        let store = JsonStore::new(&self.data_dir);
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(Metrics::new()));

        let ctx = |configured_ms: u64| {
            let delay = self
                .rate_limit
                .unwrap_or(Duration::from_millis(configured_ms));
            AgentContext::new(store.clone(), Arc::clone(&metrics)).with_rate_limit(delay)
        };

        let sources = match self.sources {
            Some(sources) => sources,
            None => SourceRegistry::from_config(&config.scraper)?,
        };

        let scorer: Arc<dyn RelevanceScorer> = match self.scorer {
            Some(scorer) => scorer,
            None => Arc::new(KeywordRelevance::new(config.filter.keywords.clone())),
        };
        let spam: Arc<dyn SpamClassifier> = match self.spam {
            Some(spam) => spam,
            None => Arc::new(HeuristicSpamClassifier::from_config(&config.filter)),
        };

        let research: Arc<dyn ResearchProvider> = match self.research {
            Some(provider) => provider,
            None => match config.research.provider {
                ResearchProviderKind::Archive => Arc::new(ArchiveResearch::new(store.clone())),
                ResearchProviderKind::Llm => Arc::new(LlmResearch::new(
                    LlmClient::from_config(&config.research.llm)?,
                    config.research.depth.clone(),
                    config.research.max_sources,
                )),
            },
        };

        let generator: Arc<dyn ContentGenerator> = match self.generator {
            Some(generator) => generator,
            None => match config.writer.generator {
                GeneratorKind::Template => Arc::new(TemplateGenerator),
                GeneratorKind::Llm => {
                    Arc::new(LlmGenerator::new(LlmClient::from_config(&config.writer.llm)?))
                }
            },
        };

        let publisher: Arc<dyn Publisher> = match self.publisher {
            Some(publisher) => publisher,
            None => match config.publisher.target {
                PublishTarget::DryRun => Arc::new(DryRunPublisher),
                PublishTarget::Devto => {
                    Arc::new(DevToPublisher::from_config(&config.publisher.devto)?)
                }
                PublishTarget::Medium => {
                    Arc::new(MediumPublisher::from_config(&config.publisher.medium)?)
                }
            },
        };

        let scraper = ScraperAgent::new(
            config.scraper.clone(),
            sources,
            ctx(config.scraper.rate_limit_ms),
        );
        let filter = FilterAgent::new(
            config.filter.clone(),
            scorer,
            spam,
            ctx(config.filter.rate_limit_ms),
        );
        let research = ResearchAgent::new(
            config.research.clone(),
            research,
            ctx(config.research.rate_limit_ms),
        );
        let writer = WriterAgent::new(
            config.writer.clone(),
            generator,
            ctx(config.writer.rate_limit_ms),
        );
        let publisher = PublisherAgent::new(
            config.publisher.clone(),
            publisher,
            ctx(config.publisher.rate_limit_ms),
        );

        Ok(Pipeline {
            scraper,
            filter,
            research,
            writer,
            publisher,
            store,
            metrics,
        })
    }
}
