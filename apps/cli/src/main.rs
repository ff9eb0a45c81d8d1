//! glossgen CLI — glossary-entry generation pipeline.
//!
//! Runs the research → outline → draft → evaluate workflow for a term,
//! with cached upstream calls and resumable runs.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
