use anyhow::Result;
use clap::Parser;

use schellar::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    cli.execute().await
}
