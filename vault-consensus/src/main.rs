// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vault_consensus::config::NodeConfig;
use vault_consensus::node::run_node;

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
struct Args {
    #[clap(long)]
    pub config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = NodeConfig::load(&args.config_path)?;

    let registry = prometheus::Registry::new();
    let node = run_node(config, &registry).await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping node");
    node.cancel.cancel();
    for handle in node.handles {
        handle.abort();
    }
    Ok(())
}
