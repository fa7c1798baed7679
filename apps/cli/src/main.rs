//! graphfeat CLI: knowledge graph embedding as a service.
//!
//! Embeds RDF datasets with an external algorithm and publishes the vectors
//! as an ARFF feature table to OpenML.

mod commands;
mod server;

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
