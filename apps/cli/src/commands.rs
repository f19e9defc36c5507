//! CLI definition, tracing setup, and the pipeline run.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use autopress_core::{Pipeline, PipelineReport, PipelineState, ProgressReporter};
use autopress_shared::{DEFAULT_CONFIG_PATH, DEFAULT_DATA_DIR, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Command-line entry point for the autopress pipeline.
#[derive(Parser, Debug)]
#[command(
    name = "autopress",
    version,
    about = "Scrape articles, keep the relevant ones, research them, draft new posts and publish.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "AUTOPRESS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory stage records are written to.
    #[arg(long, env = "AUTOPRESS_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// File log lines are appended to, in addition to stderr.
    #[arg(long, default_value = "app.log")]
    pub log_file: PathBuf,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Filter directives: `-v` and `-vv` override the configured level, and
/// chatty HTTP internals stay at `warn`.
fn filter_directives(verbose: u8, log_level: &str) -> String {
    let level = match verbose {
        0 => log_level,
        1 => "debug",
        _ => "trace",
    };
    format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn,html5ever=warn")
}

/// Log to stderr and append to the log file. `RUST_LOG` wins over both the
/// configured level and `-v`.
pub(crate) fn init_tracing(cli: &Cli, log_level: &str) -> Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(cli.verbose, log_level)));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .wrap_err_with(|| format!("cannot open log file {}", cli.log_file.display()))?;
    let json_file = file.try_clone()?;

    let json = cli.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(env_filter)
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_ansi(false).with_writer(Mutex::new(file))))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with(json.then(|| fmt::layer().json().with_writer(Mutex::new(json_file))))
        .try_init()?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Load config, set up logging, and run the pipeline once.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config);
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    init_tracing(&cli, &log_level)?;

    let config = config.wrap_err("failed to load configuration")?;
    info!(config = %cli.config.display(), data_dir = %cli.data_dir.display(), "loaded configuration");

    let pipeline =
        Pipeline::from_config(&config, &cli.data_dir).wrap_err("failed to set up pipeline")?;

    let progress = CliProgress::new();
    let report = match pipeline.run(&progress).await {
        Ok(report) => report,
        Err(e) => {
            progress.fail();
            return Err(e).wrap_err("pipeline run failed");
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &PipelineReport) {
    match report.outcome {
        PipelineState::NoArticlesFound => println!("No articles found."),
        PipelineState::NoArticlesPassedFilter => println!("No articles passed the filter."),
        _ => {
            println!(
                "Published {} article(s) in {:.1}s",
                report.published.len(),
                report.elapsed.as_secs_f64()
            );
            for result in &report.published {
                let location = result.url.as_deref().unwrap_or("-");
                println!("  [{}] {}  {location}", result.status.as_str(), result.title);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Spinner showing the current stage.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn fail(&self) {
        self.spinner.abandon_with_message("Pipeline failed");
    }
}

fn phase_message(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Scraping => "Scraping sources",
        PipelineState::Filtering => "Filtering articles",
        PipelineState::Researching => "Researching topics",
        PipelineState::Writing => "Writing drafts",
        PipelineState::Publishing => "Publishing",
        PipelineState::Done => "Done",
        PipelineState::NoArticlesFound => "No articles found",
        PipelineState::NoArticlesPassedFilter => "No articles passed the filter",
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, state: PipelineState) {
        self.spinner.set_message(phase_message(state));
    }

    fn done(&self, _report: &PipelineReport) {
        self.spinner.finish_and_clear();
    }
}
