use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod abi;
mod algod;
mod cache;
mod cli;
mod codec;
mod config;
mod group;
mod monitoring;
mod ops;
mod params;
mod persist;
mod signer;
mod simulate;
mod submit;
mod txn;

use cli::args::Cli;
use cli::context::init_tracing;
use config::{ConfigError, HarnessConfig, load_config};

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_configuration(cli.config.clone())?;
    init_tracing(&config.logging)?;
    cli::run(cli, config).await
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

fn load_configuration(path: Option<PathBuf>) -> Result<HarnessConfig, ConfigError> {
    load_config(path)
}
