//! LoyaltyScout CLI: loyalty program discovery and harvesting.
//!
//! Finds the loyalty pages of brand websites, fetches them politely, and
//! reduces them to one structured record per brand.

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
