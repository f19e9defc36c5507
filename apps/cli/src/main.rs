//! autopress CLI: one pass of the scrape, filter, research, write and
//! publish pipeline.
//!
//! Settings come from a YAML file; secrets come from the environment or a
//! `.env` file next to it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::run(cli).await
}
