//! NetWiki CLI: keep Confluence pages in sync with NetBox.
//!
//! Runs the webhook server NetBox calls on every change, applies single
//! payloads by hand, and manages the field mappings that decide which
//! values land on which `partials-<model>` page.

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
