//! LeadLens CLI: lead enrichment from the command line.
//!
//! Creates and inspects leads, runs the enrichment pipeline with live
//! progress, and exposes the validator, scorer, and fallback selector as
//! standalone commands.

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
