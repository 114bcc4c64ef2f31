//! legarde binary entry point

use clap::Parser;
use legarde::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Cli::parse().run().await
}
