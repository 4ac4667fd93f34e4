mod auth;
mod cli;
mod config;
mod duration;
mod error;
mod metrics;
mod output;
mod pipelinerun;
mod server;
mod source;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting pipelinerun-exporter");
    cli.execute().await?;

    Ok(())
}
