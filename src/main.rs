use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use service::Service;

mod allowlist;
mod config;
mod file_api;
mod service;
mod tracing;
use tracing::setup_tracing;

#[cfg(test)]
mod integration_test;
#[cfg(test)]
mod testing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::ServerConfig::load(cli.config.as_deref())?;

    let _log_guard = setup_tracing(&config)?;

    start_storage_server(config).await
}

#[::tracing::instrument(skip(config), fields(env = config.env))]
async fn start_storage_server(config: config::ServerConfig) -> anyhow::Result<()> {
    let service = Service::new(config)
        .await
        .context("Failed to create service")?;
    service.start().await.context("Failed to start service")
}
