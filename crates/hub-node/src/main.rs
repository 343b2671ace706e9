//! Chain hub entry point.

use anyhow::{Context, Result};
use clap::Parser;
use hub_node::cli::{Cli, Command, SearchArgs};
use hub_node::client::HubClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => hub_node::node::serve(args).await,
        Command::Search(args) => search(args).await,
    }
}

async fn search(args: SearchArgs) -> Result<()> {
    let request = args.to_request()?;
    let client = HubClient::new(&args.url).context("failed to create client")?;
    let results = client
        .search(&request)
        .await
        .with_context(|| format!("search against {} failed", args.url))?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
