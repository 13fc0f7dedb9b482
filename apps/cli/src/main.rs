//! DealScout CLI: search configured sources for candidate deals.
//!
//! Runs the extraction pipeline over saved or inline source configurations,
//! stores the candidates, and promotes the good ones to deals.

mod commands;
mod progress;

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
