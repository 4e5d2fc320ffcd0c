//! patternlang CLI: ingest a pattern-language corpus and serve it over HTTP.
//!
//! Parses a directory of Markdown pattern documents into a linked catalog,
//! stores it in a local database, and answers graph queries against it.

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
